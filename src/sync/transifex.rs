//! The remote translation service.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use crate::config::RemoteConfig;
use crate::core::BoxFuture;
use crate::error::SyncError;
use crate::language::LanguageTarget;

/// Remote storage for exchange files, one resource per extension within a
/// project.
pub trait TranslationService: Send + Sync {
    /// Uploads the default-language exchange file of `resource`, creating the
    /// resource when it doesn't exist yet.
    fn push<'a>(
        &'a self,
        project: &'a str,
        resource: &'a str,
        xlf: String,
    ) -> BoxFuture<'a, Result<(), SyncError>>;

    /// Downloads the current translations of `resource` into `language`.
    fn pull<'a>(
        &'a self,
        project: &'a str,
        resource: &'a str,
        language: &'a LanguageTarget,
    ) -> BoxFuture<'a, Result<String, SyncError>>;
}

/// Client of the Transifex v2 REST API.
pub struct TransifexClient {
    client: reqwest::Client,
    base: String,
    api_name: String,
    token: Option<String>,
}

impl TransifexClient {
    pub fn new(remote: &RemoteConfig) -> Result<Self, SyncError> {
        let base = format!("https://{}/api/2", remote.hostname);
        let client = reqwest::Client::builder()
            .user_agent(concat!("extforge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|source| SyncError::Http {
                url: base.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base,
            api_name: remote.api_name.clone(),
            token: remote.token.clone(),
        })
    }

    fn token(&self) -> Result<&str, SyncError> {
        self.token.as_deref().ok_or(SyncError::MissingToken)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, SyncError> {
        let response = request
            .basic_auth(&self.api_name, Some(self.token()?))
            .send()
            .await
            .map_err(|source| SyncError::Http {
                url: url.to_string(),
                source,
            })?;

        Ok(response)
    }

    async fn push_resource(
        &self,
        project: &str,
        resource: &str,
        xlf: String,
    ) -> Result<(), SyncError> {
        let url = format!(
            "{}/project/{project}/resource/{resource}/content/",
            self.base
        );
        let response = self
            .send(self.client.put(&url).json(&json!({ "content": xlf })), &url)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!("creating resource '{resource}' in '{project}'");
            let url = format!("{}/project/{project}/resources/", self.base);
            let body = json!({
                "name": resource,
                "slug": resource,
                "i18n_type": "XLIFF",
                "content": xlf,
            });
            let response = self.send(self.client.post(&url).json(&body), &url).await?;
            return check(response, &url).map(drop);
        }

        check(response, &url).map(drop)
    }

    async fn pull_resource(
        &self,
        project: &str,
        resource: &str,
        language: &LanguageTarget,
    ) -> Result<String, SyncError> {
        let url = format!(
            "{}/project/{project}/resource/{resource}/translation/{}?file&mode=onlytranslated",
            self.base,
            language.remote_id()
        );
        let response = self.send(self.client.get(&url), &url).await?;
        let response = check(response, &url)?;

        response
            .text()
            .await
            .map_err(|source| SyncError::Http { url, source })
    }
}

impl TranslationService for TransifexClient {
    fn push<'a>(
        &'a self,
        project: &'a str,
        resource: &'a str,
        xlf: String,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(self.push_resource(project, resource, xlf))
    }

    fn pull<'a>(
        &'a self,
        project: &'a str,
        resource: &'a str,
        language: &'a LanguageTarget,
    ) -> BoxFuture<'a, Result<String, SyncError>> {
        Box::pin(self.pull_resource(project, resource, language))
    }
}

fn check(response: reqwest::Response, url: &str) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::Auth {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(SyncError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}
