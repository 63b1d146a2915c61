//! Interactive questions on the terminal.

use dialoguer::{theme::ColorfulTheme, Confirm, FuzzySelect, Input};
use schemata_tenant::SchemaChoice;

pub fn ask(label: &str) -> Result<String, dialoguer::Error> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(label)
        .interact_text()
}

/// Ask once; a blank answer means "skip".
pub fn ask_optional(label: &str) -> Result<Option<String>, dialoguer::Error> {
    let answer = Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("{} (leave blank to skip)", label))
        .allow_empty(true)
        .interact_text()?;
    Ok(non_blank(answer))
}

/// Yes/no question defaulting to no.
pub fn confirm(question: &str) -> Result<bool, dialoguer::Error> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(question)
        .default(false)
        .interact()
}

/// Fuzzy picker over the schemas; `None` when the user presses Esc.
pub fn select_schema(choices: &[SchemaChoice]) -> Result<Option<usize>, dialoguer::Error> {
    let labels: Vec<&str> = choices.iter().map(|c| c.label.as_str()).collect();
    FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt("Schema to run in")
        .items(&labels)
        .default(0)
        .interact_opt()
}

fn non_blank(answer: String) -> Option<String> {
    let trimmed = answer.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_answers_are_skipped() {
        assert_eq!(non_blank(String::new()), None);
        assert_eq!(non_blank("   ".to_string()), None);
        assert_eq!(
            non_blank(" north.example.com ".to_string()).as_deref(),
            Some("north.example.com")
        );
    }
}
