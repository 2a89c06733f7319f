//! Two-stage login: public site first, then the admin backend.
//!
//! ```text
//! Anonymous --login form--> FrontendAuthenticated --admin entry--> BackendAuthenticated
//!     |                              |
//!     +---------- rejected ----------+--> Rejected        (any state) --> Terminated
//! ```

use std::time::Duration;

use crate::config::{LocationMarkers, PublisherConfig};
use crate::error::AppError;
use crate::models::Credentials;
use crate::navigation::navigate;
use crate::traits::PageDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    FrontendAuthenticated,
    BackendAuthenticated,
    /// Credentials or configuration were refused. Terminal until teardown.
    Rejected,
    Terminated,
}

/// True if `url` is inside the admin area and not a login or search page.
pub fn is_authenticated_location(url: &str, markers: &LocationMarkers) -> bool {
    url.contains(&markers.admin) && !url.contains(&markers.login) && !url.contains(&markers.search)
}

/// One browser tab plus its authentication state, owned by a single attempt.
pub struct Session<P: PageDriver> {
    page: P,
    state: AuthState,
}

impl<P: PageDriver> Session<P> {
    pub fn new(page: P) -> Self {
        Self {
            page,
            state: AuthState::Anonymous,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Drive the session to `BackendAuthenticated`.
    ///
    /// Rejection is returned as [`AppError::AuthRejected`] and is never
    /// retried here; only the navigations inside each stage are.
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials,
        config: &PublisherConfig,
    ) -> Result<(), AppError> {
        if self.state == AuthState::Anonymous {
            self.login_frontend(credentials, config).await?;
            self.state = AuthState::FrontendAuthenticated;
            tracing::info!(user = %credentials.username, "Frontend login complete");
        }

        if self.state == AuthState::FrontendAuthenticated {
            match self.enter_backend(credentials, config).await {
                Ok(()) => {
                    self.state = AuthState::BackendAuthenticated;
                    tracing::info!(user = %credentials.username, "Admin backend authenticated");
                }
                Err(e) => {
                    if matches!(e, AppError::AuthRejected(_)) {
                        self.state = AuthState::Rejected;
                    }
                    return Err(e);
                }
            }
        }

        match self.state {
            AuthState::BackendAuthenticated => Ok(()),
            state => Err(AppError::AuthRejected(format!(
                "session is {state:?}, cannot authenticate"
            ))),
        }
    }

    async fn login_frontend(
        &self,
        credentials: &Credentials,
        config: &PublisherConfig,
    ) -> Result<(), AppError> {
        let selectors = &config.selectors;
        let timings = &config.timings;

        navigate(&self.page, &config.cms.login_url, &config.navigation_retry).await?;
        settle(timings.settle).await;

        if !self
            .page
            .wait_for_selector(&selectors.login_email, timings.selector_timeout)
            .await?
        {
            tracing::info!("No login form, session already authenticated");
            return Ok(());
        }

        self.page
            .fill(&selectors.login_email, &credentials.username)
            .await?;
        self.page
            .fill(&selectors.login_password, &credentials.password)
            .await?;
        self.page.click(&selectors.login_submit).await?;
        self.await_navigation(timings.navigation_timeout).await?;
        settle(timings.settle).await;
        Ok(())
    }

    async fn enter_backend(
        &self,
        credentials: &Credentials,
        config: &PublisherConfig,
    ) -> Result<(), AppError> {
        let selectors = &config.selectors;
        let timings = &config.timings;
        let markers = &config.cms.markers;

        navigate(&self.page, &config.cms.admin_url, &config.navigation_retry).await?;
        settle(timings.settle).await;
        self.ensure_not_bounced(markers).await?;

        if self
            .page
            .wait_for_selector(&selectors.admin_password, timings.selector_timeout)
            .await?
        {
            tracing::debug!("Admin re-confirmation prompt");
            self.page
                .fill(&selectors.admin_password, &credentials.password)
                .await?;
            self.page.click(&selectors.admin_submit).await?;
            self.await_navigation(timings.navigation_timeout).await?;
            settle(timings.settle).await;
        }

        let current = self.ensure_not_bounced(markers).await?;
        if is_authenticated_location(&current, markers) {
            Ok(())
        } else {
            Err(AppError::AuthRejected(format!(
                "unexpected location after admin login: {current}"
            )))
        }
    }

    /// Landing on the public login page means the credentials were refused.
    async fn ensure_not_bounced(&self, markers: &LocationMarkers) -> Result<String, AppError> {
        let current = self.page.current_url().await?;
        if current.contains(&markers.frontend_login) {
            return Err(AppError::AuthRejected(format!(
                "redirected to public login: {current}"
            )));
        }
        Ok(current)
    }

    /// Login forms often submit via XHR and never fire a navigation.
    async fn await_navigation(&self, timeout: Duration) -> Result<(), AppError> {
        match self.page.wait_for_navigation(timeout).await {
            Ok(()) => Ok(()),
            Err(AppError::Timeout(_)) => {
                tracing::debug!("No navigation after submit, continuing");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Release the tab and browser. Safe to call on every exit path.
    pub async fn terminate(&mut self) {
        if self.state == AuthState::Terminated {
            return;
        }
        if let Err(e) = self.page.close().await {
            tracing::warn!(error = %e, "Browser teardown failed");
        }
        self.state = AuthState::Terminated;
    }
}

pub(crate) async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
