// Version and build information

/// Build information structure
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: String,
    pub build_date: String,
    pub build_hash: String,
    pub target_triple: String,
    pub profile: String,
    pub git_clean: String,
}

/// Crate version baked in at compile time
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get current build information
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: version().to_string(),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown").to_string(),
        build_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        target_triple: option_env!("BUILD_TARGET").unwrap_or("unknown").to_string(),
        profile: option_env!("BUILD_PROFILE").unwrap_or("unknown").to_string(),
        git_clean: option_env!("GIT_CLEAN").unwrap_or("unknown").to_string(),
    }
}

impl BuildInfo {
    pub fn format_display(&self) -> String {
        let mut result = format!("netpulse v{}", self.version);
        if self.build_hash != "unknown" {
            result.push_str(&format!(" (commit {})", self.build_hash));
        }
        if self.git_clean == "false" {
            result.push_str(" [dirty]");
        }
        result
    }

    pub fn format_build_info(&self) -> String {
        format!(
            "Build: {}\nTarget: {}\nProfile: {}\nGit: {}\nClean: {}",
            self.build_date, self.target_triple, self.profile, self.build_hash, self.git_clean
        )
    }
}
