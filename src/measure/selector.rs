// Engine selection and licence fallback

use crate::error::MeasurementError;
use crate::measure::{Backend, EngineKind, ResultRecord, Target};

/// Operator preferences for the two engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnginePolicy {
    /// Use the external tool when it is installed
    pub prefer_primary: bool,
    /// Allow the library engine when the tool is missing or unlicensed
    pub allow_fallback: bool,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            prefer_primary: true,
            allow_fallback: true,
        }
    }
}

/// Result of engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub engine: EngineKind,
    /// Primary was wanted but is not installed
    pub primary_missing: bool,
}

/// Pick an engine from policy and whether the tool is installed
pub fn select_engine(policy: EnginePolicy, primary_installed: bool) -> Result<Selection, MeasurementError> {
    if !policy.prefer_primary {
        return Ok(Selection {
            engine: EngineKind::Secondary,
            primary_missing: false,
        });
    }
    if primary_installed {
        return Ok(Selection {
            engine: EngineKind::Primary,
            primary_missing: false,
        });
    }
    if !policy.allow_fallback {
        return Err(MeasurementError::EngineUnavailable(
            "the speed test CLI is required (--require-primary) but was not found on PATH".to_string(),
        ));
    }
    Ok(Selection {
        engine: EngineKind::Secondary,
        primary_missing: true,
    })
}

/// Runs one measurement on whichever engine the policy selects
pub struct Measurer<P, S> {
    primary: P,
    secondary: S,
    policy: EnginePolicy,
}

impl<P: Backend, S: Backend> Measurer<P, S> {
    pub fn new(primary: P, secondary: S, policy: EnginePolicy) -> Self {
        Self {
            primary,
            secondary,
            policy,
        }
    }

    /// Probe the environment and apply the policy
    pub fn select(&self) -> Result<Selection, MeasurementError> {
        select_engine(self.policy, self.primary.is_available())
    }

    /// One attempt. A licence failure on the primary engine falls through to
    /// the secondary engine straight away when fallback is permitted.
    pub async fn measure(&self, target: &Target) -> Result<ResultRecord, MeasurementError> {
        match self.select()?.engine {
            EngineKind::Primary => match self.primary.measure(target).await {
                Err(MeasurementError::LicenseRequired(reason)) if self.policy.allow_fallback => {
                    tracing::warn!(target_server = %target, %reason, "CLI license not accepted, falling back to library engine");
                    self.secondary.measure(target).await
                }
                other => other,
            },
            EngineKind::Secondary => self.secondary.measure(target).await,
        }
    }
}
