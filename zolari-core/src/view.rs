//! Text rendering of the application state.
//!
//! Every component is a borrowed view implementing `Display`, so the CLI can
//! `print!` it and tests can compare strings. Nothing here touches the network
//! or the session.

use std::fmt;

use crate::controller::{AppState, AuthState};
use crate::types::{Depth, ResearchDraft, ResearchResult, ResearchType, Urgency, UserProfile};

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[90m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[1;34m";
const RESET: &str = "\x1b[0m";

const PROGRESS_WIDTH: usize = 20;

/// The three stacked layers of the Zolari mark.
pub struct Logo;

impl fmt::Display for Logo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{BLUE}    /\\{RESET}")?;
        writeln!(f, "{BLUE}   /~~\\{RESET}")?;
        writeln!(f, "{BLUE}  /~~~~\\{RESET}")
    }
}

/// Brand line plus the account action.
pub struct Header<'a> {
    pub profile: Option<&'a UserProfile>,
}

impl fmt::Display for Header<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BLUE}/~\\{RESET} {BOLD}Zolari{RESET}")?;
        match self.profile {
            Some(profile) => {
                write!(f, "  {}", profile.email)?;
                if let Some(ref picture) = profile.picture {
                    write!(f, " {DIM}({}){RESET}", picture)?;
                }
                writeln!(f, "  [Logout]")
            }
            None => writeln!(f, "  [Login]"),
        }
    }
}

pub struct Spinner;

impl fmt::Display for Spinner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{DIM}  ⠋ loading...{RESET}")
    }
}

fn progress_bar(percent: u8) -> String {
    let filled = usize::from(percent) * PROGRESS_WIDTH / 100;
    format!(
        "[{}{}]",
        "█".repeat(filled),
        "░".repeat(PROGRESS_WIDTH - filled)
    )
}

/// One research record.
pub struct ResultCard<'a>(pub &'a ResearchResult);

impl fmt::Display for ResultCard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        if result.is_completed() {
            writeln!(f, "  {GREEN}✔{RESET} {BOLD}{}{RESET}", result.topic)?;
            writeln!(
                f,
                "    {DIM}Completed {}{RESET}",
                result.completed_at.as_deref().unwrap_or_default()
            )?;
        } else {
            let percent = result.progress_percent();
            writeln!(f, "  {YELLOW}◷{RESET} {BOLD}{}{RESET}", result.topic)?;
            writeln!(f, "    {}", progress_bar(percent))?;
            write!(f, "    {DIM}{}% Complete", percent)?;
            if let Some(ref remaining) = result.time_remaining {
                write!(f, "  {} remaining", remaining)?;
            }
            writeln!(f, "{RESET}")?;
        }
        if let Some(ref pdf) = result.pdf_url {
            writeln!(f, "    View PDF: {}", pdf)?;
        }
        Ok(())
    }
}

pub struct ResultsList<'a> {
    pub results: &'a [ResearchResult],
    pub loading: bool,
}

impl fmt::Display for ResultsList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{BOLD}Your Research{RESET}")?;
        if self.results.is_empty() {
            if self.loading {
                return write!(f, "{}", Spinner);
            }
            writeln!(f, "  You haven't submitted any research requests yet.")?;
            return writeln!(f, "  Use the form to get started.");
        }
        for result in self.results {
            write!(f, "{}", ResultCard(result))?;
        }
        Ok(())
    }
}

/// Label shown next to a depth level.
pub fn depth_label(depth: Depth) -> &'static str {
    match depth.level() {
        1 => "Overview",
        2 => "Summary",
        3 => "Standard",
        4 => "Detailed",
        _ => "In-depth",
    }
}

/// The request draft with its choices and the last submission message.
pub struct RequestForm<'a> {
    pub draft: &'a ResearchDraft,
    pub message: Option<&'a str>,
}

impl fmt::Display for RequestForm<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let draft = self.draft;
        writeln!(f, "{BOLD}New Research Request{RESET}")?;
        if draft.has_topic() {
            writeln!(f, "  Research Topic: {}", draft.topic)?;
        } else {
            writeln!(f, "  Research Topic: {DIM}e.g., AI in e-commerce{RESET}")?;
        }

        let types: Vec<&str> = ResearchType::ALL.iter().map(ResearchType::label).collect();
        writeln!(f, "  Research Type:  {}", draft.research_type)?;
        writeln!(f, "    {DIM}{}{RESET}", types.join(" | "))?;

        writeln!(
            f,
            "  Depth Level:    {} ({})",
            draft.depth,
            depth_label(draft.depth)
        )?;
        writeln!(f, "    {DIM}1 Overview .. 5 In-depth{RESET}")?;

        let urgencies: Vec<&str> = Urgency::ALL.iter().map(Urgency::label).collect();
        writeln!(f, "  Urgency:        {}", draft.urgency)?;
        writeln!(f, "    {DIM}{}{RESET}", urgencies.join(" | "))?;

        if let Some(message) = self.message {
            writeln!(f, "  {}", message)?;
        }
        Ok(())
    }
}

/// Shown to anonymous users.
pub struct Landing;

impl fmt::Display for Landing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Logo)?;
        writeln!(f, "{BOLD}Welcome to Zolari{RESET}")?;
        writeln!(f, "Your AI-Powered Research Co-pilot")?;
        writeln!(f)?;
        writeln!(f, "Log in to submit research requests and follow their progress.")
    }
}

pub struct ErrorBanner<'a>(pub &'a str);

impl fmt::Display for ErrorBanner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RED}! {}{RESET}", self.0)
    }
}

/// The whole screen for one state snapshot.
pub struct AppView<'a> {
    pub state: &'a AppState,
    pub draft: &'a ResearchDraft,
}

impl fmt::Display for AppView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state;
        if state.auth == AuthState::Loading {
            return write!(f, "{}", Spinner);
        }

        write!(
            f,
            "{}",
            Header {
                profile: state.profile()
            }
        )?;
        writeln!(f)?;
        if let Some(ref error) = state.error {
            write!(f, "{}", ErrorBanner(error))?;
            writeln!(f)?;
        }

        if !state.is_authenticated() {
            return write!(f, "{}", Landing);
        }

        write!(
            f,
            "{}",
            RequestForm {
                draft: self.draft,
                message: state.form_message.map(|m| m.text()),
            }
        )?;
        writeln!(f)?;
        write!(
            f,
            "{}",
            ResultsList {
                results: &state.results,
                loading: state.results_loading,
            }
        )
    }
}

/// Remove ANSI colour sequences, for logs and tests.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::FormMessage;
    use crate::types::ResearchStatus;
    use pretty_assertions::assert_eq;

    fn completed(date: &str) -> ResearchResult {
        ResearchResult {
            id: "1".into(),
            topic: "X".into(),
            status: ResearchStatus::Completed,
            progress: None,
            time_remaining: None,
            completed_at: Some(date.into()),
            pdf_url: None,
        }
    }

    fn plain(view: impl fmt::Display) -> String {
        strip_ansi(&view.to_string())
    }

    #[test]
    fn test_completed_card_shows_date_without_progress() {
        let out = plain(ResultCard(&completed("2024-01-01")));
        assert!(out.contains("✔ X"));
        assert!(out.contains("Completed 2024-01-01"));
        assert!(!out.contains("% Complete"));
        assert!(!out.contains('█') && !out.contains('░'));
    }

    #[test]
    fn test_in_progress_card() {
        let result = ResearchResult {
            status: ResearchStatus::InProgress,
            progress: Some(45.0),
            time_remaining: Some("2 hours".into()),
            completed_at: None,
            pdf_url: Some("https://files.test/r.pdf".into()),
            ..completed("")
        };
        let out = plain(ResultCard(&result));
        assert!(out.contains("◷ X"));
        assert!(out.contains("45% Complete"));
        assert!(out.contains("2 hours remaining"));
        assert!(out.contains(&format!("[{}{}]", "█".repeat(9), "░".repeat(11))));
        assert!(out.contains("View PDF: https://files.test/r.pdf"));
    }

    #[test]
    fn test_missing_progress_renders_zero() {
        let result = ResearchResult {
            status: ResearchStatus::InProgress,
            ..completed("")
        };
        let out = plain(ResultCard(&result));
        assert!(out.contains("0% Complete"));
        assert!(!out.contains("remaining"));
    }

    #[test]
    fn test_results_list_states() {
        let empty = plain(ResultsList {
            results: &[],
            loading: false,
        });
        assert_eq!(
            empty,
            "Your Research\n  You haven't submitted any research requests yet.\n  Use the form to get started.\n"
        );

        let loading = plain(ResultsList {
            results: &[],
            loading: true,
        });
        assert!(loading.contains("loading"));
        assert!(!loading.contains("haven't"));

        // A refresh in progress keeps showing the current list.
        let results = [completed("2024-01-01")];
        let refreshing = plain(ResultsList {
            results: &results,
            loading: true,
        });
        assert!(refreshing.contains("Completed 2024-01-01"));
        assert!(!refreshing.contains("loading"));
    }

    #[test]
    fn test_header() {
        let profile = UserProfile {
            picture: Some("https://img.test/p.png".into()),
            ..UserProfile::with_email("a@b.com")
        };
        let out = plain(Header {
            profile: Some(&profile),
        });
        assert!(out.contains("a@b.com"));
        assert!(out.contains("https://img.test/p.png"));
        assert!(out.contains("[Logout]"));

        assert!(plain(Header { profile: None }).contains("[Login]"));
    }

    #[test]
    fn test_request_form() {
        let draft = ResearchDraft::default();
        let out = plain(RequestForm {
            draft: &draft,
            message: Some(FormMessage::Submitted.text()),
        });
        assert!(out.contains("Research Type:  Market Analysis"));
        assert!(out.contains("Depth Level:    3 (Standard)"));
        assert!(out.contains("Urgency:        Standard"));
        assert!(out.contains("Product Viability"));
        assert!(out.contains("Research request submitted successfully!"));
    }

    #[test]
    fn test_depth_labels() {
        assert_eq!(depth_label(Depth::new(1).unwrap()), "Overview");
        assert_eq!(depth_label(Depth::new(5).unwrap()), "In-depth");
    }

    #[test]
    fn test_app_view_anonymous() {
        let state = AppState {
            auth: AuthState::Anonymous,
            error: Some("Authentication process failed.".into()),
            ..Default::default()
        };
        let out = plain(AppView {
            state: &state,
            draft: &ResearchDraft::default(),
        });
        assert!(out.contains("[Login]"));
        assert!(out.contains("! Authentication process failed."));
        assert!(out.contains("Welcome to Zolari"));
        assert!(out.contains("Your AI-Powered Research Co-pilot"));
        assert!(!out.contains("Your Research"));
    }

    #[test]
    fn test_app_view_loading() {
        let state = AppState::default();
        let out = plain(AppView {
            state: &state,
            draft: &ResearchDraft::default(),
        });
        assert!(out.contains("loading"));
        assert!(!out.contains("Welcome"));
    }

    #[test]
    fn test_app_view_workspace_with_fetch_error() {
        let state = AppState {
            auth: AuthState::Authenticated(UserProfile::with_email("a@b.com")),
            error: Some("Could not load research results. Please try again later.".into()),
            ..Default::default()
        };
        let out = plain(AppView {
            state: &state,
            draft: &ResearchDraft::default(),
        });
        assert!(out.contains("New Research Request"));
        assert!(out.contains("Your Research"));
        assert!(out.contains("Could not load research results"));
        assert!(out.contains("You haven't submitted any research requests yet."));
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;34mZolari\x1b[0m!"), "Zolari!");
    }
}
