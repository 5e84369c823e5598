//! GitHub endpoints.
//!
//! Authenticated with a personal access token (`personal_access_token`
//! secret), an OAuth configuration (`oauth_configuration_id` attribute) or,
//! when neither is given, the GitHub App installation token. The latter can
//! only be imported, the lifecycle reconciler refuses to create or update it.

use std::collections::BTreeMap;

use super::{FieldAdapter, base_local, base_remote, is_redacted};
use crate::error::Result;
use crate::model::{EndpointAuthorization, ServiceEndpoint};
use crate::record::EndpointConfig;

pub const GITHUB_URL: &str = "https://github.com";

const SCHEME_TOKEN: &str = "Token";
const SCHEME_OAUTH: &str = "OAuth";
const SCHEME_INSTALLATION: &str = "InstallationToken";

pub struct GitHubAdapter;

impl FieldAdapter for GitHubAdapter {
    fn endpoint_type(&self) -> &str {
        "github"
    }

    fn to_remote(&self, config: &EndpointConfig) -> Result<ServiceEndpoint> {
        let mut endpoint = base_remote(config, self.endpoint_type());
        endpoint.url = Some(GITHUB_URL.to_string());

        let authorization = if let Some(token) = config.secret("personal_access_token") {
            EndpointAuthorization::new(SCHEME_TOKEN).with_parameter("AccessToken", token)
        } else if let Some(configuration) = config.attribute("oauth_configuration_id") {
            EndpointAuthorization::new(SCHEME_OAUTH)
                .with_parameter("ConfigurationId", configuration)
                .with_parameter("AccessToken", "")
        } else {
            EndpointAuthorization {
                scheme: SCHEME_INSTALLATION.to_string(),
                parameters: BTreeMap::new(),
            }
        };
        endpoint.authorization = Some(authorization);
        Ok(endpoint)
    }

    fn from_remote(&self, endpoint: &ServiceEndpoint, previous: &EndpointConfig) -> EndpointConfig {
        let mut config = base_local(endpoint, previous);
        let Some(auth) = &endpoint.authorization else {
            return config;
        };

        if auth.scheme.eq_ignore_ascii_case(SCHEME_OAUTH) {
            if let Some(configuration) = auth.parameters.get("ConfigurationId") {
                config
                    .attributes
                    .insert("oauth_configuration_id".to_string(), configuration.clone());
            }
        } else if auth.scheme.eq_ignore_ascii_case(SCHEME_TOKEN) {
            let echoed = auth.parameters.get("AccessToken").filter(|t| !is_redacted(t));
            let token = echoed.or_else(|| previous.authorization.get("personal_access_token"));
            if let Some(token) = token {
                config
                    .authorization
                    .insert("personal_access_token".to_string(), token.clone());
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ScopeId;

    fn config() -> EndpointConfig {
        EndpointConfig::new(ScopeId::new("p1"), "github", "gh")
    }

    #[test]
    fn test_personal_access_token() {
        let mut local = config();
        local
            .authorization
            .insert("personal_access_token".into(), "ghp_123".into());
        let ep = GitHubAdapter.to_remote(&local).unwrap();
        assert_eq!(ep.url.as_deref(), Some(GITHUB_URL));
        assert_eq!(ep.scheme(), Some("Token"));
        assert_eq!(ep.authorization.as_ref().unwrap().parameters["AccessToken"], "ghp_123");

        let mut echoed = ep.clone();
        echoed.authorization.as_mut().unwrap().parameters.clear();
        let back = GitHubAdapter.from_remote(&echoed, &local);
        assert_eq!(back.authorization["personal_access_token"], "ghp_123");
        assert_eq!(back.auth_scheme.as_deref(), Some("Token"));
    }

    #[test]
    fn test_oauth() {
        let mut local = config();
        local
            .attributes
            .insert("oauth_configuration_id".into(), "cfg-1".into());
        let ep = GitHubAdapter.to_remote(&local).unwrap();
        assert_eq!(ep.scheme(), Some("OAuth"));

        let back = GitHubAdapter.from_remote(&ep, &config());
        assert_eq!(back.attributes["oauth_configuration_id"], "cfg-1");
    }

    #[test]
    fn test_no_credentials_means_app_installation() {
        let ep = GitHubAdapter.to_remote(&config()).unwrap();
        assert_eq!(ep.scheme(), Some("InstallationToken"));
        assert!(crate::lifecycle::check_create(&ep).is_err());
    }
}
