//! Slack Web API client.

use std::{collections::HashMap, time::Duration};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    serde_json::{Value, json},
    taskrelay_channels::ChatOutbound,
    tokio::sync::RwLock,
    tracing::debug,
};

use crate::error::{Error, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Who the bot token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotIdentity {
    pub user_id: String,
    #[serde(rename = "user")]
    pub name: String,
}

/// Web API client for one bot.
///
/// Display names are looked up once per user and cached for the life of the
/// client.
pub struct SlackApi {
    http: reqwest::Client,
    api_base: String,
    bot_token: Secret<String>,
    app_token: Option<Secret<String>>,
    names: RwLock<HashMap<String, String>>,
}

impl SlackApi {
    pub fn new(
        api_base: &str,
        bot_token: Secret<String>,
        app_token: Option<Secret<String>>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            app_token,
            names: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    async fn post(&self, method: &str, token: &Secret<String>, body: Option<Value>) -> Result<Value> {
        let mut request = self
            .http
            .post(self.url(method))
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(&body);
        }
        read_response(method, request.send().await?).await
    }

    /// Resolve the bot's own user ID and name (`auth.test`).
    pub async fn auth_test(&self) -> Result<BotIdentity> {
        let body = self.post("auth.test", &self.bot_token, None).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Open a Socket Mode session and return its WebSocket URL
    /// (`apps.connections.open`, app-level token).
    pub async fn open_socket_url(&self) -> Result<String> {
        let token = self
            .app_token
            .as_ref()
            .ok_or_else(|| Error::Config("chat.slack.app_token is not set".into()))?;
        let body = self.post("apps.connections.open", token, None).await?;
        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Api {
                method: "apps.connections.open".into(),
                error: "response has no url".into(),
            })
    }

    /// The name a user goes by (`users.info`), cached.
    ///
    /// Prefers the profile display name and falls back to the account name.
    pub async fn display_name(&self, user_id: &str) -> Result<String> {
        if let Some(name) = self.names.read().await.get(user_id) {
            return Ok(name.clone());
        }

        let response = self
            .http
            .get(self.url("users.info"))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("user", user_id)])
            .send()
            .await?;
        let body = read_response("users.info", response).await?;
        let user = &body["user"];
        let name = [
            &user["profile"]["display_name"],
            &user["name"],
            &user["profile"]["real_name"],
        ]
        .into_iter()
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .unwrap_or(user_id)
        .to_string();

        debug!(user_id, name = %name, "resolved slack display name");
        self.names
            .write()
            .await
            .insert(user_id.to_string(), name.clone());
        Ok(name)
    }

    /// Post a plain-text message to a channel or, given a user ID, to the
    /// bot's direct conversation with that user (`chat.postMessage`).
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let body = json!({ "channel": channel, "text": text });
        self.post("chat.postMessage", &self.bot_token, Some(body))
            .await?;
        Ok(())
    }
}

async fn read_response(method: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status {
            method: method.to_string(),
            status,
        });
    }
    let body: Value = response.json().await?;
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        Ok(body)
    } else {
        Err(Error::Api {
            method: method.to_string(),
            error: body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string(),
        })
    }
}

#[async_trait]
impl ChatOutbound for SlackApi {
    async fn send_text(&self, to: &str, text: &str) -> taskrelay_channels::Result<()> {
        self.post_message(to, text).await.map_err(Into::into)
    }
}
