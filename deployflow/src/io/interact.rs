//! The human side of both conversations.
//!
//! The [`Prompter`] trait decouples the conversations from the terminal.
//! Tests use scripted prompters that return predetermined answers.

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};

/// Questions the tool needs answered by a person.
pub trait Prompter {
    /// Free-text answer; an empty reply yields `default`.
    fn ask(&self, prompt: &str, default: &str) -> Result<String>;

    /// Yes/no answer; an empty reply yields `default`.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;

    /// Hidden input for credentials.
    fn secret(&self, prompt: &str) -> Result<String>;
}

/// Interactive terminal prompts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&self, prompt: &str, default: &str) -> Result<String> {
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .allow_empty(true);
        if !default.is_empty() {
            input = input.default(default.to_string());
        }
        let answer = input
            .interact_text()
            .with_context(|| format!("read answer to '{prompt}'"))?;
        if answer.trim().is_empty() {
            return Ok(default.to_string());
        }
        Ok(answer)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default)
            .interact()
            .with_context(|| format!("read confirmation for '{prompt}'"))
    }

    fn secret(&self, prompt: &str) -> Result<String> {
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .with_context(|| format!("read secret for '{prompt}'"))
    }
}
