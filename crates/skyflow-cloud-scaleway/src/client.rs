//! Scaleway compute API client
//!
//! Direct HTTP implementation of [`ScalewayApi`] using token authentication.

use crate::api::{
    Ip, RuleDefinition, SecurityGroupRule, Server, ServerAction, ServerDefinition, ServerPatch,
    Volume, VolumeDefinition,
};
use crate::error::{Result, ScalewayError};
use crate::gateway::ScalewayApi;
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const AUTH_HEADER: &str = "X-Auth-Token";

/// HTTP client for one organization in one region
#[derive(Clone)]
pub struct ScalewayClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    organization: String,
}

impl ScalewayClient {
    pub fn new(
        token: impl Into<String>,
        organization: impl Into<String>,
        region: impl AsRef<str>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("https://cp-{}.scaleway.com", region.as_ref()),
            token: token.into(),
            organization: organization.into(),
        }
    }

    /// Point the client at another endpoint (local mocks, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        tracing::debug!("{} {}", method, path);
        self.http
            .request(method, self.url(path))
            .header(AUTH_HEADER, &self.token)
    }

    /// Turn a non-2xx response into [`ScalewayError::Api`]
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    body
                }
            });

        Err(ScalewayError::api(status.as_u16(), message))
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.request(method, path).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn send_ignoring_body<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()> {
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.send_ignoring_body::<()>(Method::DELETE, path, None)
            .await
    }

    fn owned<'a, T: Serialize>(&'a self, inner: &'a T) -> Owned<'a, T> {
        Owned {
            organization: &self.organization,
            inner,
        }
    }
}

#[async_trait]
impl ScalewayApi for ScalewayClient {
    async fn get_server(&self, id: &str) -> Result<Server> {
        let envelope: ServerEnvelope = self.fetch(&format!("/servers/{}", id)).await?;
        Ok(envelope.server)
    }

    async fn create_server(&self, definition: &ServerDefinition) -> Result<Server> {
        let envelope: ServerEnvelope = self
            .send(Method::POST, "/servers", &self.owned(definition))
            .await?;
        Ok(envelope.server)
    }

    async fn patch_server(&self, id: &str, patch: &ServerPatch) -> Result<()> {
        self.send_ignoring_body(Method::PATCH, &format!("/servers/{}", id), Some(patch))
            .await
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        self.remove(&format!("/servers/{}", id)).await
    }

    async fn server_action(&self, id: &str, action: ServerAction) -> Result<()> {
        let body = ActionRequest {
            action: action.as_str(),
        };
        self.send_ignoring_body(
            Method::POST,
            &format!("/servers/{}/action", id),
            Some(&body),
        )
        .await
    }

    async fn create_volume(&self, definition: &VolumeDefinition) -> Result<Volume> {
        let envelope: VolumeEnvelope = self
            .send(Method::POST, "/volumes", &self.owned(definition))
            .await?;
        Ok(envelope.volume)
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        self.remove(&format!("/volumes/{}", id)).await
    }

    async fn list_ips(&self) -> Result<Vec<Ip>> {
        let envelope: IpsEnvelope = self.fetch("/ips").await?;
        Ok(envelope.ips)
    }

    async fn get_ip(&self, id: &str) -> Result<Ip> {
        let envelope: IpEnvelope = self.fetch(&format!("/ips/{}", id)).await?;
        Ok(envelope.ip)
    }

    async fn create_ip(&self) -> Result<Ip> {
        let envelope: IpEnvelope = self
            .send(Method::POST, "/ips", &self.owned(&serde_json::Map::new()))
            .await?;
        Ok(envelope.ip)
    }

    async fn attach_ip(&self, ip_id: &str, server_id: &str) -> Result<()> {
        let body = IpBinding {
            server: Some(server_id),
        };
        self.send_ignoring_body(Method::PATCH, &format!("/ips/{}", ip_id), Some(&body))
            .await
    }

    async fn detach_ip(&self, ip_id: &str) -> Result<()> {
        let body = IpBinding { server: None };
        self.send_ignoring_body(Method::PATCH, &format!("/ips/{}", ip_id), Some(&body))
            .await
    }

    async fn delete_ip(&self, id: &str) -> Result<()> {
        self.remove(&format!("/ips/{}", id)).await
    }

    async fn list_user_data(&self, server_id: &str) -> Result<Vec<String>> {
        let keys: UserDataKeys = self
            .fetch(&format!("/servers/{}/user_data", server_id))
            .await?;
        Ok(keys.user_data)
    }

    async fn get_user_data(&self, server_id: &str, key: &str) -> Result<String> {
        let response = self
            .request(
                Method::GET,
                &format!("/servers/{}/user_data/{}", server_id, key),
            )
            .send()
            .await?;
        Ok(Self::check(response).await?.text().await?)
    }

    async fn patch_user_data(&self, server_id: &str, key: &str, value: &str) -> Result<()> {
        let response = self
            .request(
                Method::PATCH,
                &format!("/servers/{}/user_data/{}", server_id, key),
            )
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(value.to_string())
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_user_data(&self, server_id: &str, key: &str) -> Result<()> {
        self.remove(&format!("/servers/{}/user_data/{}", server_id, key))
            .await
    }

    async fn create_security_group_rule(
        &self,
        group_id: &str,
        definition: &RuleDefinition,
    ) -> Result<SecurityGroupRule> {
        let envelope: RuleEnvelope = self
            .send(
                Method::POST,
                &format!("/security_groups/{}/rules", group_id),
                definition,
            )
            .await?;
        Ok(envelope.rule)
    }

    async fn get_security_group_rule(
        &self,
        group_id: &str,
        rule_id: &str,
    ) -> Result<SecurityGroupRule> {
        let envelope: RuleEnvelope = self
            .fetch(&format!("/security_groups/{}/rules/{}", group_id, rule_id))
            .await?;
        Ok(envelope.rule)
    }

    async fn delete_security_group_rule(&self, group_id: &str, rule_id: &str) -> Result<()> {
        self.remove(&format!("/security_groups/{}/rules/{}", group_id, rule_id))
            .await
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// Request body stamped with the owning organization
#[derive(Serialize)]
struct Owned<'a, T: Serialize> {
    organization: &'a str,
    #[serde(flatten)]
    inner: &'a T,
}

#[derive(Serialize)]
struct ActionRequest {
    action: &'static str,
}

#[derive(Serialize)]
struct IpBinding<'a> {
    server: Option<&'a str>,
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: Server,
}

#[derive(Deserialize)]
struct VolumeEnvelope {
    volume: Volume,
}

#[derive(Deserialize)]
struct IpEnvelope {
    ip: Ip,
}

#[derive(Deserialize)]
struct IpsEnvelope {
    ips: Vec<Ip>,
}

#[derive(Deserialize)]
struct UserDataKeys {
    user_data: Vec<String>,
}

#[derive(Deserialize)]
struct RuleEnvelope {
    rule: SecurityGroupRule,
}
