//! User-facing output of a checkout session.

use std::sync::Mutex;

use serde::Serialize;

use crate::code::ActivationCode;
use crate::plans::PlanConfig;

/// Sink for everything the buyer should see.
///
/// Calls come in the order loading → (code | error) → loading hidden, but a
/// presenter must tolerate `hide_loading` without a matching `show_loading`.
pub trait Presenter: Send + Sync {
    fn display_code(&self, code: &ActivationCode, plan: &PlanConfig);

    fn show_loading(&self, message: &str);

    fn hide_loading(&self);

    fn show_error(&self, message: &str);
}

/// Prints to the terminal; used by the CLI.
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn display_code(&self, code: &ActivationCode, plan: &PlanConfig) {
        println!();
        println!("============================================");
        println!("  Your premium code: {}", code);
        println!("============================================");
        println!("  Plan:     {} ({})", plan.name, plan.price);
        println!("  Duration: {} days", plan.days);
        println!();
        println!("Copy this code into the app to activate premium.");
    }

    fn show_loading(&self, message: &str) {
        println!("{}", message);
    }

    fn hide_loading(&self) {}

    fn show_error(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Logs presenter calls; used where nobody is watching a screen.
#[derive(Debug, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn display_code(&self, code: &ActivationCode, plan: &PlanConfig) {
        tracing::info!(code = %code.masked(), plan = %plan.name, "Activation code displayed");
    }

    fn show_loading(&self, message: &str) {
        tracing::debug!("{}", message);
    }

    fn hide_loading(&self) {}

    fn show_error(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum PresenterEvent {
    Code(String),
    Loading(String),
    LoadingHidden,
    Error(String),
}

/// Keeps every call so it can be replayed to an HTTP client.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresenterEvent>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PresenterEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Messages passed to `show_error`, oldest first.
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PresenterEvent::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: PresenterEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Presenter for RecordingPresenter {
    fn display_code(&self, code: &ActivationCode, _plan: &PlanConfig) {
        self.push(PresenterEvent::Code(code.to_string()));
    }

    fn show_loading(&self, message: &str) {
        self.push(PresenterEvent::Loading(message.to_string()));
    }

    fn hide_loading(&self) {
        self.push(PresenterEvent::LoadingHidden);
    }

    fn show_error(&self, message: &str) {
        self.push(PresenterEvent::Error(message.to_string()));
    }
}
