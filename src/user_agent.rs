//! Shared User-Agent strings for the API client, downloads, and the proxy.
//!
//! Single source for the project URL and UA format so outbound traffic from
//! every client in the crate identifies itself the same way.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/portal";

/// Default User-Agent for API and download requests.
#[must_use]
pub(crate) fn default_client_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("portal/{version} (site-client; +{PROJECT_UA_URL})")
}

/// User-Agent the gateway uses when the inbound request carried none.
#[must_use]
pub(crate) fn default_proxy_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("portal/{version} (gateway; +{PROJECT_UA_URL})")
}
