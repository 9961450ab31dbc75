//! Session resolution against the vendor cloud.
//!
//! A stored session is reused while its access token is comfortably
//! inside its lifetime, refreshed once it is not, and replaced by a fresh
//! login when the refresh is rejected. The session is then proven by
//! listing the account's devices; if that first use fails the session is
//! discarded and a forced login gets exactly one more listing attempt.

use aero_core::{Credentials, EpochSecs};
use aerogrid_state::VendorSession;
use tracing::{debug, info, warn};

use crate::api::{VendorApi, VendorDevice};
use crate::error::VendorResult;

/// Seconds before `access_expires_at` at which a session counts as expired.
pub const EXPIRY_MARGIN_SECS: u64 = 60;

/// How the session handed to the first listing attempt was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    Reused,
    Refreshed,
    LoggedIn,
}

/// A session that has been proven by listing the account's devices.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session: VendorSession,
    pub devices: Vec<VendorDevice>,
    /// Source of the session that was finally used.
    pub source: SessionSource,
    /// Whether the first listing failed and a forced login was needed.
    pub relogged: bool,
}

/// Turns credentials plus an optional stored session into a live one.
pub struct SessionResolver<'a, V> {
    vendor: &'a V,
    expiry_margin_secs: u64,
}

impl<'a, V: VendorApi> SessionResolver<'a, V> {
    pub fn new(vendor: &'a V) -> Self {
        Self {
            vendor,
            expiry_margin_secs: EXPIRY_MARGIN_SECS,
        }
    }

    pub fn with_expiry_margin(mut self, secs: u64) -> Self {
        self.expiry_margin_secs = secs;
        self
    }

    /// Whether `session` can be used at `now` without a refresh.
    pub fn is_fresh(&self, session: &VendorSession, now: EpochSecs) -> bool {
        session.access_expires_at > now.saturating_add(self.expiry_margin_secs)
    }

    /// Obtain a session without touching the device listing.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        stored: Option<&VendorSession>,
        now: EpochSecs,
    ) -> VendorResult<(VendorSession, SessionSource)> {
        let Some(stored) = stored else {
            debug!("no stored vendor session, logging in");
            let session = self.vendor.login(credentials).await?;
            return Ok((session, SessionSource::LoggedIn));
        };

        if self.is_fresh(stored, now) {
            debug!(
                user_id = %stored.user_id,
                expires_at = stored.access_expires_at,
                "reusing stored vendor session"
            );
            return Ok((stored.clone(), SessionSource::Reused));
        }

        match self.vendor.refresh(stored).await {
            Ok(session) => {
                debug!(user_id = %session.user_id, "vendor session refreshed");
                Ok((session, SessionSource::Refreshed))
            }
            Err(e) => {
                info!(error = %e, "vendor session refresh failed, logging in");
                let session = self.vendor.login(credentials).await?;
                Ok((session, SessionSource::LoggedIn))
            }
        }
    }

    /// Authenticate, then list devices with at most one forced relogin.
    pub async fn resolve(
        &self,
        credentials: &Credentials,
        stored: Option<&VendorSession>,
        now: EpochSecs,
    ) -> VendorResult<ResolvedSession> {
        let (session, source) = self.authenticate(credentials, stored, now).await?;

        match self.vendor.list_devices(&session).await {
            Ok(devices) => Ok(ResolvedSession {
                session,
                devices,
                source,
                relogged: false,
            }),
            Err(first) => {
                warn!(
                    error = %first,
                    ?source,
                    "device listing failed, forcing a fresh vendor login"
                );
                let session = self.vendor.login(credentials).await?;
                let devices = self.vendor.list_devices(&session).await?;
                Ok(ResolvedSession {
                    session,
                    devices,
                    source: SessionSource::LoggedIn,
                    relogged: true,
                })
            }
        }
    }
}
