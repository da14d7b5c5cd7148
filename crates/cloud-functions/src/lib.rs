//! Server-side request handlers for WebFront.
//!
//! - [`ChatProxy`]: relays a conversation to the language model, keeping the
//!   provider key off the client
//! - [`InvitationSender`]: mails a provisioned client its temporary
//!   credentials; admin callers only
//!
//! Handlers return [`FunctionResult`]; [`wire_response`] renders either
//! outcome as the JSON body the caller receives.

mod chat;
mod context;
mod error;
mod invite;

pub use chat::{
    ChatProxy, ChatRequest, ChatResponse, ChatRole, ChatTurn, GeminiClient, LanguageModel, Prompt,
    PromptRole, PromptTurn,
};
pub use context::{CallerAuth, CallerContext};
pub use error::{wire_response, FunctionError, FunctionResult};
pub use invite::{
    HttpMailTransport, Invitation, InvitationRequest, InvitationResponse, InvitationSender,
    MailTransport,
};
