pub mod chat;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod mail;
pub mod message;
pub mod push;
pub mod router;
pub mod session;
pub mod subscribers;

pub use chat::{ChatDispatcher, ChatTransport, TelegramChatTransport};
pub use delivery::{DeferredQueue, DeliveryService, DeliverySummary};
pub use dispatcher::{ChannelDispatcher, DeliveryPolicy, DispatchReport, ExpiredEndpoint};
pub use error::DeliveryError;
pub use fanout::FanOut;
pub use mail::{MailDispatcher, MailTransport, SmtpMailTransport};
pub use message::AlertMessage;
pub use push::{GatewayPushTransport, PushDispatcher, PushTransport};
pub use router::{ChannelBatches, NotificationRouter, RoutePlan};
pub use session::{ChatCommand, ChatCommandError, ChatReply, ChatSession, ChatSessionStore, ChatState};
pub use subscribers::{JsonSubscriberRepository, MemorySubscriberRepository, SubscriberRepository};
