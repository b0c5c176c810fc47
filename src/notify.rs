//! Alert delivery.
//!
//! [`Notifier`] is the seam. Two transports implement it:
//!
//! | Transport | Type | API |
//! |-----------|------|-----|
//! | Slack | [`SlackClient`] | Web API `chat.postMessage` with a bot token |
//! | Kakao | [`KakaoClient`] | "send to me" memo API, OAuth access token refreshed from a refresh token |
//!
//! [`Transport`] picks one at runtime from [`NotifierOptions::kind`].
//!
//! Callers log failures and move on: an alert is never retried.

use crate::models::ArticleRecord;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::error::Error;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

/// Button target when an alert carries no link.
const NAVER_NEWS_HOME: &str = "https://news.naver.com/";
/// Kakao rejects text templates longer than this many characters.
const KAKAO_TEXT_LIMIT: usize = 200;

pub trait Notifier {
    /// Called before every watch cycle, e.g. to refresh credentials.
    async fn prepare(&self) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    /// Deliver `message`. `link` points at the article when there is one.
    async fn send(&self, channel: &str, message: &str, link: Option<&str>) -> Result<(), Box<dyn Error>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Slack,
    Kakao,
}

/// Transport selection and API endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierOptions {
    pub kind: NotifierKind,
    pub slack_base_url: String,
    pub kakao_api_base: String,
    pub kakao_auth_base: String,
}

impl Default for NotifierOptions {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Slack,
            slack_base_url: "https://slack.com/api".to_string(),
            kakao_api_base: "https://kapi.kakao.com".to_string(),
            kakao_auth_base: "https://kauth.kakao.com".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Slack
// ---------------------------------------------------------------------------

pub struct SlackClient {
    client: reqwest::Client,
    token: String,
    endpoint: String,
}

impl fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl SlackClient {
    pub fn new(client: reqwest::Client, token: String, options: &NotifierOptions) -> Self {
        Self {
            client,
            token,
            endpoint: format!("{}/chat.postMessage", options.slack_base_url.trim_end_matches('/')),
        }
    }
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

impl Notifier for SlackClient {
    async fn send(&self, channel: &str, message: &str, _link: Option<&str>) -> Result<(), Box<dyn Error>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "channel": channel, "text": message }))
            .send()
            .await?
            .error_for_status()?
            .json::<SlackResponse>()
            .await?;

        if !resp.ok {
            return Err(format!("slack error: {}", resp.error.unwrap_or_else(|| "unknown".to_string())).into());
        }
        info!(ts = resp.ts.as_deref().unwrap_or(""), "Slack message posted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Kakao
// ---------------------------------------------------------------------------

/// Kakao app credentials.
#[derive(Clone)]
pub struct KakaoCredentials {
    /// REST API key of the Kakao app, sent as `client_id`.
    pub rest_api_key: String,
    pub refresh_token: String,
    /// Optional starting access token; refreshed before every cycle anyway.
    pub access_token: Option<String>,
}

/// Sends alerts to the token owner's own KakaoTalk ("send to me").
///
/// Access tokens are short-lived; [`Notifier::prepare`] exchanges the refresh
/// token for a new one. Kakao may rotate the refresh token in the same
/// response, in which case the new one is used from then on.
pub struct KakaoClient {
    client: reqwest::Client,
    rest_api_key: String,
    refresh_token: RwLock<String>,
    access_token: RwLock<Option<String>>,
    send_url: String,
    token_url: String,
}

impl fmt::Debug for KakaoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KakaoClient")
            .field("send_url", &self.send_url)
            .field("token_url", &self.token_url)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct KakaoTokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct KakaoSendResponse {
    result_code: i64,
}

/// `template_object` payload for a plain text memo with a "뉴스 보기" button.
pub fn kakao_template(message: &str, link: Option<&str>) -> Value {
    let link = link.filter(|l| !l.is_empty()).unwrap_or(NAVER_NEWS_HOME);
    let text: String = message.chars().take(KAKAO_TEXT_LIMIT).collect();
    json!({
        "object_type": "text",
        "text": text,
        "link": { "web_url": link, "mobile_web_url": link },
        "button_title": "뉴스 보기",
    })
}

impl KakaoClient {
    pub fn new(client: reqwest::Client, credentials: KakaoCredentials, options: &NotifierOptions) -> Self {
        let api = options.kakao_api_base.trim_end_matches('/');
        let auth = options.kakao_auth_base.trim_end_matches('/');
        Self {
            client,
            rest_api_key: credentials.rest_api_key,
            refresh_token: RwLock::new(credentials.refresh_token),
            access_token: RwLock::new(credentials.access_token),
            send_url: format!("{api}/v2/api/talk/memo/default/send"),
            token_url: format!("{auth}/oauth/token"),
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// HTTP failures and responses without an `access_token`. The previous
    /// access token is kept in that case.
    #[instrument(level = "info", skip_all)]
    pub async fn refresh(&self) -> Result<(), Box<dyn Error>> {
        let refresh_token = self.refresh_token.read().await.clone();
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.rest_api_key.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ];
        let resp = self.client.post(&self.token_url).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("kakao token refresh failed with {status}: {body}").into());
        }

        let token = resp.json::<KakaoTokenResponse>().await?;
        let access = token.access_token.ok_or("kakao token response has no access_token")?;
        *self.access_token.write().await = Some(access);
        if let Some(rotated) = token.refresh_token {
            info!("Kakao refresh token rotated");
            *self.refresh_token.write().await = rotated;
        }
        info!("Kakao access token refreshed");
        Ok(())
    }
}

impl Notifier for KakaoClient {
    async fn prepare(&self) -> Result<(), Box<dyn Error>> {
        self.refresh().await
    }

    async fn send(&self, _channel: &str, message: &str, link: Option<&str>) -> Result<(), Box<dyn Error>> {
        if self.access_token.read().await.is_none() {
            self.refresh().await?;
        }
        let access = self
            .access_token
            .read()
            .await
            .clone()
            .ok_or("no Kakao access token")?;

        let template = kakao_template(message, link).to_string();
        let resp = self
            .client
            .post(&self.send_url)
            .bearer_auth(&access)
            .form(&[("template_object", template.as_str())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("kakao send failed with {status}: {body}").into());
        }

        let sent = resp.json::<KakaoSendResponse>().await?;
        if sent.result_code != 0 {
            return Err(format!("kakao send returned result_code {}", sent.result_code).into());
        }
        info!("Kakao memo sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runtime selection
// ---------------------------------------------------------------------------

/// The transport chosen in config.
#[derive(Debug)]
pub enum Transport {
    Slack(SlackClient),
    Kakao(KakaoClient),
}

impl Notifier for Transport {
    async fn prepare(&self) -> Result<(), Box<dyn Error>> {
        match self {
            Transport::Slack(slack) => slack.prepare().await,
            Transport::Kakao(kakao) => kakao.prepare().await,
        }
    }

    async fn send(&self, channel: &str, message: &str, link: Option<&str>) -> Result<(), Box<dyn Error>> {
        match self {
            Transport::Slack(slack) => slack.send(channel, message, link).await,
            Transport::Kakao(kakao) => kakao.send(channel, message, link).await,
        }
    }
}

/// Alert text for a negative article.
pub fn format_alert(record: &ArticleRecord) -> String {
    let mut message = String::from("🚨 [부정기사 감지]\n");
    message.push_str(&format!("분류: {}\n", record.category));
    message.push_str(&format!("키워드: {}\n", record.keyword));
    message.push_str(&format!("제목: {}\n", record.title));
    message.push_str(&format!("언론사: {}\n", record.outlet));
    message.push_str(&format!("링크: {}\n", record.id));
    if let Some(summary) = record.summary.as_deref().filter(|s| !s.is_empty()) {
        message.push_str(&format!("요약: {}\n", summary));
    }
    message.push_str(&format!("감지 시각: {}\n", Local::now().format("%Y.%m.%d %H:%M")));
    message
}

/// Send one alert; returns whether it was delivered. Failures are logged only.
#[instrument(level = "info", skip(notifier, message))]
pub async fn send_logged<N: Notifier>(notifier: &N, channel: &str, message: &str, link: Option<&str>) -> bool {
    match notifier.send(channel, message, link).await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "Notification failed; not retrying");
            false
        }
    }
}

/// Run [`Notifier::prepare`], logging a failure instead of returning it.
pub async fn prepare_logged<N: Notifier>(notifier: &N) {
    if let Err(e) = notifier.prepare().await {
        warn!(error = %e, "Notifier preparation failed; sends may fail this cycle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        fail: bool,
        sent: RefCell<Vec<(String, String)>>,
    }

    impl Notifier for Recorder {
        async fn send(&self, channel: &str, message: &str, _link: Option<&str>) -> Result<(), Box<dyn Error>> {
            if self.fail {
                return Err("channel_not_found".into());
            }
            self.sent.borrow_mut().push((channel.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn record() -> ArticleRecord {
        let mut r = ArticleRecord::new("https://n.news.naver.com/1", "보험금 미지급 논란", "한겨레");
        r.category = "당사".to_string();
        r.keyword = "삼성생명".to_string();
        r.summary = Some("보험금 지급 거절로 소비자 불만".to_string());
        r
    }

    #[test]
    fn test_format_alert_contains_fields() {
        let message = format_alert(&record());
        assert!(message.starts_with("🚨 [부정기사 감지]"));
        assert!(message.contains("키워드: 삼성생명"));
        assert!(message.contains("언론사: 한겨레"));
        assert!(message.contains("링크: https://n.news.naver.com/1"));
        assert!(message.contains("요약: 보험금 지급 거절로 소비자 불만"));
    }

    #[test]
    fn test_format_alert_omits_empty_summary() {
        let mut r = record();
        r.summary = None;
        assert!(!format_alert(&r).contains("요약:"));
    }

    #[tokio::test]
    async fn test_send_logged_reports_outcome() {
        let ok = Recorder::default();
        assert!(send_logged(&ok, "#news-feed", "hello", None).await);
        assert_eq!(ok.sent.borrow()[0], ("#news-feed".to_string(), "hello".to_string()));

        let failing = Recorder { fail: true, ..Default::default() };
        assert!(!send_logged(&failing, "#news-feed", "hello", None).await);
    }

    #[test]
    fn test_kakao_template_shape() {
        let template = kakao_template("알림", Some("https://n.news.naver.com/1"));
        assert_eq!(template["object_type"], "text");
        assert_eq!(template["text"], "알림");
        assert_eq!(template["link"]["web_url"], "https://n.news.naver.com/1");
        assert_eq!(template["link"]["mobile_web_url"], "https://n.news.naver.com/1");
        assert_eq!(template["button_title"], "뉴스 보기");

        let fallback = kakao_template(&"가".repeat(300), None);
        assert_eq!(fallback["link"]["web_url"], NAVER_NEWS_HOME);
        assert_eq!(fallback["text"].as_str().unwrap().chars().count(), KAKAO_TEXT_LIMIT);
    }

    fn credentials() -> KakaoCredentials {
        KakaoCredentials {
            rest_api_key: "rest-key".to_string(),
            refresh_token: "refresh-1".to_string(),
            access_token: None,
        }
    }

    fn local_options(url: &str) -> NotifierOptions {
        NotifierOptions {
            kind: NotifierKind::Kakao,
            slack_base_url: url.to_string(),
            kakao_api_base: url.to_string(),
            kakao_auth_base: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_kakao_refreshes_token_then_sends_template() {
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("client_id".into(), "rest-key".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"access-2","token_type":"bearer","expires_in":21599}"#)
            .create_async()
            .await;
        let link = "https://n.news.naver.com/1";
        let send = server
            .mock("POST", "/v2/api/talk/memo/default/send")
            .match_header("authorization", "Bearer access-2")
            .match_body(Matcher::UrlEncoded(
                "template_object".into(),
                kakao_template("알림", Some(link)).to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result_code":0}"#)
            .create_async()
            .await;

        let kakao = KakaoClient::new(reqwest::Client::new(), credentials(), &local_options(&server.url()));
        kakao.prepare().await.unwrap();
        kakao.send("", "알림", Some(link)).await.unwrap();

        token.assert_async().await;
        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_kakao_uses_rotated_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"access-2","refresh_token":"refresh-2"}"#)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"access-3"}"#)
            .create_async()
            .await;

        let kakao = KakaoClient::new(reqwest::Client::new(), credentials(), &local_options(&server.url()));
        kakao.refresh().await.unwrap();
        kakao.refresh().await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(kakao.access_token.read().await.as_deref(), Some("access-3"));
    }

    #[tokio::test]
    async fn test_kakao_refresh_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let kakao = KakaoClient::new(reqwest::Client::new(), credentials(), &local_options(&server.url()));
        let err = kakao.send("", "알림", None).await.unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_kakao_nonzero_result_code_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _send = server
            .mock("POST", "/v2/api/talk/memo/default/send")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result_code":-401}"#)
            .create_async()
            .await;

        let mut creds = credentials();
        creds.access_token = Some("access-1".to_string());
        let kakao = KakaoClient::new(reqwest::Client::new(), creds, &local_options(&server.url()));
        let err = kakao.send("", "알림", None).await.unwrap_err();
        assert!(err.to_string().contains("-401"));
    }

    #[tokio::test]
    async fn test_slack_not_ok_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let post = server
            .mock("POST", "/chat.postMessage")
            .match_header("authorization", "Bearer xoxb-test")
            .match_body(Matcher::PartialJson(json!({ "channel": "#news-feed", "text": "hello" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"error":"channel_not_found"}"#)
            .create_async()
            .await;

        let slack = SlackClient::new(reqwest::Client::new(), "xoxb-test".to_string(), &local_options(&server.url()));
        let transport = Transport::Slack(slack);
        transport.prepare().await.unwrap();
        let err = transport.send("#news-feed", "hello", None).await.unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
        post.assert_async().await;
    }
}
