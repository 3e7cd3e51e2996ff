//! 通知模块
//! Notification module
//!
//! 任务运行失败时的可选通知出口：SMTP 邮件和 HTTP 回调。
//! 两者都是尽力而为，传输失败只记录日志。
//! Optional sinks invoked on job-run failures: SMTP email and HTTP
//! callback. Both are best-effort; transport failures are only logged.

use crate::job::Job;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// 邮件通知配置
/// Email notification configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
  /// SMTP 服务器主机名
  /// SMTP server hostname
  pub smtp_server: String,
  /// SMTP 端口
  /// SMTP port
  pub port: u16,
  /// 认证用户名
  /// Auth username
  pub username: String,
  /// 认证密码
  /// Auth password
  pub password: String,
  /// 发件人地址
  /// Sender address
  pub sender: String,
  /// 收件人列表
  /// Recipient list
  pub recipients: Vec<String>,
}

/// HTTP 回调通知配置
/// HTTP callback notification configuration
#[derive(Debug, Clone)]
pub struct HttpCallbackConfig {
  /// 回调地址
  /// Callback URL
  pub url: String,
  /// 消息类型标签，例如 `text`
  /// Message type tag, e.g. `text`
  pub message_type: String,
  /// 要提醒的列表
  /// Mention list
  pub mention_list: Vec<String>,
}

/// 发送任务错误邮件
/// Send a job error email
pub async fn send_email(config: &EmailConfig, j: &Job, err_msg: &str) {
  let subject = "Job Error Notification";
  let body = format!("An error occurred in job '{}': {}", j.full_name(), err_msg);

  let from = match config.sender.parse() {
    Ok(from) => from,
    Err(e) => {
      warn!("Failed to parse email sender `{}`: {}", config.sender, e);
      return;
    }
  };
  let mut builder = Message::builder().from(from).subject(subject);
  for recipient in &config.recipients {
    match recipient.parse() {
      Ok(to) => builder = builder.to(to),
      Err(e) => {
        warn!("Failed to parse email recipient `{}`: {}", recipient, e);
        return;
      }
    }
  }
  let message = match builder.header(ContentType::TEXT_PLAIN).body(body) {
    Ok(message) => message,
    Err(e) => {
      warn!("Failed to build email message: {}", e);
      return;
    }
  };

  let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
    .port(config.port)
    .credentials(Credentials::new(
      config.username.clone(),
      config.password.clone(),
    ))
    .build();

  if let Err(e) = transport.send(message).await {
    warn!("Failed to send email: {}", e);
  }
}

/// 发送任务错误 HTTP 回调
/// Send a job error HTTP callback
pub async fn http_callback(config: &HttpCallbackConfig, _j: &Job, err_msg: &str) {
  let mut message = Map::new();
  message.insert("msgtype".to_string(), Value::from(config.message_type.clone()));
  message.insert(
    config.message_type.clone(),
    json!({
      "content": err_msg,
      "mentioned_list": config.mention_list,
    }),
  );

  let client = reqwest::Client::new();
  match client.post(&config.url).json(&message).send().await {
    Ok(resp) => match resp.text().await {
      Ok(body) => info!("HTTP callback response: {}", body),
      Err(e) => warn!("Failed to read HTTP callback response: {}", e),
    },
    Err(e) => warn!("Failed to send HTTP callback: {}", e),
  }
}

/// 把一次运行失败转发给已配置的出口
/// Forward one run failure to the configured sinks
pub async fn notify_job_failure(
  email_config: &Option<EmailConfig>,
  http_callback_config: &Option<HttpCallbackConfig>,
  j: &Job,
  err_msg: &str,
) {
  if let Some(config) = email_config {
    send_email(config, j, err_msg).await;
  }
  if let Some(config) = http_callback_config {
    http_callback(config, j, err_msg).await;
  }
}
