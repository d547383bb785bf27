//! Intent Classifier
//!
//! Deterministic keyword classification of short customer replies:
//! yes/no answers, restart commands, loan-change requests, rejection-menu
//! choices and document commands.

use crate::extraction::contains_keyword;
use serde::{Deserialize, Serialize};

/// Static keyword lists
const AFFIRMATIVE_WORDS: &[&str] = &[
    "yes", "yep", "yeah", "ya", "y", "sure", "ok", "okay", "proceed", "accept", "accepted",
    "correct", "confirm", "confirmed", "agree", "agreed", "fine", "right", "haan",
    "go ahead", "sounds good", "looks good", "that works", "let's do it",
];

const NEGATIVE_WORDS: &[&str] = &[
    "no", "n", "nope", "nah", "cancel", "stop", "not", "incorrect", "wrong", "nahi",
    "don't", "dont", "unsure", "unacceptable", "disagree", "decline", "reject",
];

const RESTART_COMMANDS: &[&str] = &["restart", "reset", "start over", "start new", "new application"];

const LOAN_FIELD_WORDS: &[&str] = &[
    "amount", "tenure", "purpose", "year", "month", "lakh", "lac", "emi",
];

const CHANGE_WORDS: &[&str] = &["change", "update", "modify", "wrong", "increase", "reduce", "edit"];

const SECURED_WORDS: &[&str] = &["secured", "secure", "collateral", "mortgage", "pledge", "against my", "loan against"];

const NEW_APPLICATION_PHRASES: &[&str] = &[
    "new loan", "another loan", "second loan", "one more loan", "apply again", "more money",
    "additional loan",
];

const MAXIMUM_WORDS: &[&str] = &["max", "maximum", "full", "all", "entire", "highest"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionIntent {
    LowerAmount,
    SecuredLoan,
    AcceptPreApproved,
    Counseling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentCommand {
    Upload,
    Skip,
}

/// Details a customer may correct during verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailField {
    Name,
    Phone,
    Address,
    Email,
}

impl DetailField {
    pub fn label(&self) -> &'static str {
        match self {
            DetailField::Name => "name",
            DetailField::Phone => "phone number",
            DetailField::Address => "address",
            DetailField::Email => "email",
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == '*' || c == '.' || c == '!' || c.is_whitespace())
        .to_lowercase()
}

fn any_keyword(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| contains_keyword(text, kw))
}

/// Whole words only; phrases and words with punctuation still match as substrings
fn any_word(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| {
        if !word.chars().all(char::is_alphanumeric) {
            text.contains(word)
        } else {
            text.split(|c: char| !c.is_alphanumeric()).any(|token| token == *word)
        }
    })
}

/// Intent classifier
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn is_affirmative(text: &str) -> bool {
        let text = normalize(text);
        any_word(&text, AFFIRMATIVE_WORDS) && !any_word(&text, NEGATIVE_WORDS)
    }

    pub fn is_negative(text: &str) -> bool {
        any_word(&normalize(text), NEGATIVE_WORDS)
    }

    /// The whole message is a restart command
    pub fn is_restart(text: &str) -> bool {
        RESTART_COMMANDS.contains(&normalize(text).as_str())
    }

    /// Message asks to change amount, tenure or purpose
    pub fn requests_loan_change(text: &str) -> bool {
        let text = normalize(text);
        any_keyword(&text, LOAN_FIELD_WORDS) && any_keyword(&text, CHANGE_WORDS)
    }

    pub fn wants_secured_loan(text: &str) -> bool {
        any_word(&normalize(text), SECURED_WORDS)
    }

    pub fn wants_new_application(text: &str) -> bool {
        any_keyword(&normalize(text), NEW_APPLICATION_PHRASES)
    }

    pub fn wants_maximum(text: &str) -> bool {
        any_word(&normalize(text), MAXIMUM_WORDS)
    }

    /// Natural-language choice from the rejection menu
    pub fn rejection_intent(text: &str) -> Option<RejectionIntent> {
        let text = normalize(text);

        if any_word(&text, SECURED_WORDS) {
            Some(RejectionIntent::SecuredLoan)
        } else if any_keyword(&text, &["counsel", "advice", "advise", "talk to"]) || any_word(&text, &["help", "improve"]) {
            Some(RejectionIntent::Counseling)
        } else if any_keyword(&text, &["try that"])
            || any_word(&text, &["lower", "reduce", "reduced", "smaller", "less", "suggested"])
        {
            Some(RejectionIntent::LowerAmount)
        } else if any_word(&text, NEGATIVE_WORDS) {
            None
        } else if any_keyword(&text, &["pre-approved", "preapproved", "pre approved"])
            || any_word(&text, &["accept", "yes", "ok", "okay", "sure"])
        {
            Some(RejectionIntent::AcceptPreApproved)
        } else {
            None
        }
    }

    /// Leading option number ("2", "option 3", "#1")
    pub fn menu_number(text: &str) -> Option<usize> {
        let text = normalize(text);
        let stripped = text
            .trim_start_matches("option")
            .trim_start_matches('#')
            .trim();
        let digits: String = stripped.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() || stripped.len() > digits.len() + 12 {
            return None;
        }
        digits.parse().ok()
    }

    pub fn document_command(text: &str) -> Option<DocumentCommand> {
        let text = normalize(text);
        if any_keyword(&text, &["upload", "manual upload", "uploaded", "attach", "send"]) {
            Some(DocumentCommand::Upload)
        } else if any_keyword(&text, &["skip", "later", "don't have"]) {
            Some(DocumentCommand::Skip)
        } else {
            None
        }
    }

    /// Which personal detail a correction message refers to
    pub fn detail_field(text: &str) -> Option<DetailField> {
        let text = normalize(text);
        if any_keyword(&text, &["phone", "mobile", "number"]) {
            Some(DetailField::Phone)
        } else if any_keyword(&text, &["email", "e-mail", "mail"]) {
            Some(DetailField::Email)
        } else if any_keyword(&text, &["address", "street", "house"]) {
            Some(DetailField::Address)
        } else if any_keyword(&text, &["name", "spelling"]) {
            Some(DetailField::Name)
        } else {
            None
        }
    }
}
