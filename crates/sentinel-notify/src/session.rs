use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 聊天账号状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    #[default]
    Unverified,
    Verified,
    Subscribed,
    Unsubscribed,
}

impl ChatState {
    /// 对应订阅者的 (chat_enabled, chat_verified)
    pub fn subscriber_flags(&self) -> (bool, bool) {
        match self {
            ChatState::Unverified => (false, false),
            ChatState::Verified => (false, true),
            ChatState::Subscribed => (true, true),
            ChatState::Unsubscribed => (false, true),
        }
    }

    /// 由订阅者保存的标记还原状态（已验证未订阅统一视为 Verified）
    pub fn from_subscriber_flags(enabled: bool, verified: bool) -> Self {
        match (enabled, verified) {
            (true, true) => ChatState::Subscribed,
            (false, true) => ChatState::Verified,
            _ => ChatState::Unverified,
        }
    }
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatState::Unverified => "unverified",
            ChatState::Verified => "verified",
            ChatState::Subscribed => "subscribed",
            ChatState::Unsubscribed => "unsubscribed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatCommandError {
    #[error("Empty message")]
    Empty,

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Missing verification code")]
    MissingCode,
}

/// 机器人命令（封闭集合）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Start,
    Verify(String),
    Subscribe,
    Unsubscribe,
    Status,
    Help,
}

impl FromStr for ChatCommand {
    type Err = ChatCommandError;

    /// 只看第一个空白分隔的词，`/cmd@bot` 形式去掉机器人名；不做前缀匹配
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.split_whitespace();
        let token = parts.next().ok_or(ChatCommandError::Empty)?;
        let command = token.split('@').next().unwrap_or(token).to_ascii_lowercase();

        match command.as_str() {
            "/start" => Ok(ChatCommand::Start),
            "/verify" => parts
                .next()
                .map(|code| ChatCommand::Verify(code.to_string()))
                .ok_or(ChatCommandError::MissingCode),
            "/subscribe" => Ok(ChatCommand::Subscribe),
            "/unsubscribe" => Ok(ChatCommand::Unsubscribe),
            "/status" => Ok(ChatCommand::Status),
            "/help" => Ok(ChatCommand::Help),
            _ => Err(ChatCommandError::Unknown(token.to_string())),
        }
    }
}

const HELP: &str = "Commands:\n\
/start - begin\n\
/verify <code> - link this chat to your account\n\
/subscribe - receive alerts here\n\
/unsubscribe - stop receiving alerts\n\
/status - show subscription status\n\
/help - show this message";

/// 单个聊天账号的会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub handle: String,
    pub state: ChatState,
    /// 账户系统签发的一次性验证码
    #[serde(skip_serializing)]
    pub pending_code: Option<String>,
}

impl ChatSession {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            state: ChatState::Unverified,
            pending_code: None,
        }
    }

    /// 执行命令，返回新状态和回复
    pub fn apply(&mut self, command: ChatCommand) -> (ChatState, String) {
        use ChatState::*;

        let reply = match (self.state, command) {
            (_, ChatCommand::Help) => HELP.to_string(),
            (state, ChatCommand::Status) => format!("Status: {}", state),

            (Unverified, ChatCommand::Start) => {
                "Welcome. Send /verify <code> with the code from your account page.".to_string()
            }
            (state, ChatCommand::Start) => format!("Welcome back. Status: {}", state),

            (Unverified, ChatCommand::Verify(code)) => match self.pending_code.as_deref() {
                Some(expected) if expected == code => {
                    self.pending_code = None;
                    self.state = Verified;
                    "Verified. Send /subscribe to receive alerts.".to_string()
                }
                Some(_) => "Invalid verification code.".to_string(),
                None => "No verification pending. Request a code from your account page.".to_string(),
            },
            (_, ChatCommand::Verify(_)) => "This chat is already verified.".to_string(),

            (Unverified, ChatCommand::Subscribe) => "Verify this chat first with /verify <code>.".to_string(),
            (Subscribed, ChatCommand::Subscribe) => "Already subscribed.".to_string(),
            (Verified | Unsubscribed, ChatCommand::Subscribe) => {
                self.state = Subscribed;
                "Subscribed. Alerts will be delivered here.".to_string()
            }

            (Subscribed, ChatCommand::Unsubscribe) => {
                self.state = Unsubscribed;
                "Unsubscribed. Send /subscribe to resume.".to_string()
            }
            (_, ChatCommand::Unsubscribe) => "Not subscribed.".to_string(),
        };

        (self.state, reply)
    }
}

/// 命令处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub handle: String,
    pub previous: ChatState,
    pub state: ChatState,
    pub reply: String,
}

impl ChatReply {
    pub fn changed(&self) -> bool {
        self.previous != self.state
    }
}

/// 会话存储，按 handle 区分
#[derive(Default)]
pub struct ChatSessionStore {
    sessions: RwLock<HashMap<String, ChatSession>>,
}

impl ChatSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 账户系统签发验证码
    pub async fn issue_code(&self, handle: &str, code: impl Into<String>) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(handle.to_string())
            .or_insert_with(|| ChatSession::new(handle));
        session.pending_code = Some(code.into());
        debug!(handle = %handle, "Verification code issued");
    }

    pub async fn get(&self, handle: &str) -> Option<ChatSession> {
        self.sessions.read().await.get(handle).cloned()
    }

    /// 会话不存在时按给定状态建立，返回是否新建
    pub async fn seed(&self, handle: &str, state: ChatState) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(handle) {
            return false;
        }

        let mut session = ChatSession::new(handle);
        session.state = state;
        sessions.insert(handle.to_string(), session);
        debug!(handle = %handle, state = %state, "Chat session restored");
        true
    }

    /// 处理一条消息；未知命令返回错误
    pub async fn handle_text(&self, handle: &str, text: &str) -> Result<ChatReply, ChatCommandError> {
        let command: ChatCommand = text.parse()?;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(handle.to_string())
            .or_insert_with(|| ChatSession::new(handle));

        let previous = session.state;
        let (state, reply) = session.apply(command);
        if previous != state {
            info!(handle = %handle, from = %previous, to = %state, "Chat session state changed");
        }

        Ok(ChatReply {
            handle: handle.to_string(),
            previous,
            state,
            reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_closed_vocabulary() {
        assert_eq!("/start".parse::<ChatCommand>(), Ok(ChatCommand::Start));
        assert_eq!("/help@SentinelBot".parse::<ChatCommand>(), Ok(ChatCommand::Help));
        assert_eq!(
            "/verify 123456 extra".parse::<ChatCommand>(),
            Ok(ChatCommand::Verify("123456".to_string()))
        );
        assert_eq!("/verify".parse::<ChatCommand>(), Err(ChatCommandError::MissingCode));
        assert_eq!("   ".parse::<ChatCommand>(), Err(ChatCommandError::Empty));
        // 不做前缀匹配
        assert!(matches!("/sub".parse::<ChatCommand>(), Err(ChatCommandError::Unknown(_))));
        assert!(matches!("/subscribers".parse::<ChatCommand>(), Err(ChatCommandError::Unknown(_))));
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = ChatSession::new("42");
        session.pending_code = Some("777".to_string());

        assert_eq!(session.apply(ChatCommand::Subscribe).0, ChatState::Unverified);
        assert_eq!(session.apply(ChatCommand::Verify("000".to_string())).0, ChatState::Unverified);
        assert_eq!(session.apply(ChatCommand::Verify("777".to_string())).0, ChatState::Verified);
        assert!(session.pending_code.is_none());

        assert_eq!(session.apply(ChatCommand::Subscribe).0, ChatState::Subscribed);
        assert_eq!(session.apply(ChatCommand::Unsubscribe).0, ChatState::Unsubscribed);
        assert_eq!(session.apply(ChatCommand::Unsubscribe).0, ChatState::Unsubscribed);
        assert_eq!(session.apply(ChatCommand::Subscribe).0, ChatState::Subscribed);

        let (state, reply) = session.apply(ChatCommand::Status);
        assert_eq!(state, ChatState::Subscribed);
        assert_eq!(reply, "Status: subscribed");
    }

    #[tokio::test]
    async fn test_store_handles_text() {
        let store = ChatSessionStore::new();
        store.issue_code("42", "9999").await;

        let reply = store.handle_text("42", "/verify 9999").await.unwrap();
        assert!(reply.changed());
        assert_eq!(reply.state, ChatState::Verified);
        assert_eq!(reply.state.subscriber_flags(), (false, true));

        let reply = store.handle_text("42", "/subscribe").await.unwrap();
        assert_eq!(reply.state.subscriber_flags(), (true, true));

        assert!(store.handle_text("42", "hello").await.is_err());
        assert_eq!(store.get("42").await.unwrap().state, ChatState::Subscribed);
    }

    #[tokio::test]
    async fn test_restored_session_can_unsubscribe() {
        let store = ChatSessionStore::new();
        let state = ChatState::from_subscriber_flags(true, true);
        assert!(store.seed("42", state).await);

        let reply = store.handle_text("42", "/unsubscribe").await.unwrap();
        assert!(reply.changed());
        assert_eq!(reply.previous, ChatState::Subscribed);
        assert_eq!(reply.state.subscriber_flags(), (false, true));

        // 已有会话不被覆盖
        assert!(!store.seed("42", ChatState::Subscribed).await);
        assert_eq!(store.get("42").await.unwrap().state, ChatState::Unsubscribed);
    }

    #[test]
    fn test_state_from_subscriber_flags() {
        assert_eq!(ChatState::from_subscriber_flags(false, false), ChatState::Unverified);
        assert_eq!(ChatState::from_subscriber_flags(true, false), ChatState::Unverified);
        assert_eq!(ChatState::from_subscriber_flags(false, true), ChatState::Verified);
        assert_eq!(ChatState::from_subscriber_flags(true, true), ChatState::Subscribed);
    }
}
