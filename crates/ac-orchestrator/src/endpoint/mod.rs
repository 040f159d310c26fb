//! Endpoint variants
//!
//! Every communication surface implements [`ac_core::traits::Endpoint`].
//! [`EndpointFactory`] is the single place that maps an [`EndpointKind`]
//! to a concrete variant.
//!
//! [`EndpointKind`]: ac_core::EndpointKind

mod console;
mod factory;
mod persisting;
mod posting;
mod telegram;
mod ui;

pub use console::ConsoleEndpoint;
pub use factory::{EndpointFactory, EndpointOptions};
pub use persisting::PersistingEndpoint;
pub use posting::{
    parse_pr_url, GitHubPrComments, JiraComments, Outbound, PostTarget, PostingEndpoint,
    TeamsWebhook,
};
pub use telegram::{escape_html, translate_command, TelegramEndpoint};
pub use ui::UiEndpoint;
