//! Interactive prompts for `--interactive` runs.
//!
//! Before fetching, the user enters the start and (optional) end of the
//! publish-date range. After writing, a one-letter menu offers to sort the
//! destination.

use crate::cli::parse_date;
use crate::models::{DateWindow, ISO_DATE};
use chrono::NaiveDate;
use dialoguer::Input;
use dialoguer::theme::ColorfulTheme;

/// Answer to the post-write menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Sort,
    Exit,
}

/// Parse an optional `YYYY-MM-DD` answer; empty means "no date".
pub fn parse_optional_date(input: &str) -> Result<Option<NaiveDate>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    parse_date(input).map(Some)
}

/// Parse a menu answer: `s` sorts, `e` or `q` exits. Case-insensitive.
pub fn parse_menu_choice(input: &str) -> Option<MenuChoice> {
    match input.trim().to_ascii_lowercase().as_str() {
        "s" => Some(MenuChoice::Sort),
        "e" | "q" => Some(MenuChoice::Exit),
        _ => None,
    }
}

/// Ask for the date range. The start defaults to `default_start`.
pub fn prompt_date_range(default_start: NaiveDate) -> Result<DateWindow, dialoguer::Error> {
    let theme = ColorfulTheme::default();

    let start: String = Input::with_theme(&theme)
        .with_prompt("Collect items published since (YYYY-MM-DD)")
        .default(default_start.format(ISO_DATE).to_string())
        .validate_with(|s: &String| parse_date(s).map(|_| ()))
        .interact_text()?;
    let start = parse_date(&start).unwrap_or(default_start);

    let end: String = Input::with_theme(&theme)
        .with_prompt("Up to (YYYY-MM-DD, empty for no limit)")
        .allow_empty(true)
        .validate_with(move |s: &String| match parse_optional_date(s)? {
            Some(end) if end < start => Err(format!("must not be before {start}")),
            _ => Ok(()),
        })
        .interact_text()?;

    Ok(match parse_optional_date(&end).ok().flatten() {
        Some(end) => DateWindow::between(start, end),
        None => DateWindow::since(start),
    })
}

/// Ask whether to sort the destination before exiting.
pub fn prompt_menu() -> Result<MenuChoice, dialoguer::Error> {
    let answer: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("[s] sort the destination, [e] exit")
        .validate_with(|s: &String| {
            parse_menu_choice(s)
                .map(|_| ())
                .ok_or_else(|| "type s or e".to_string())
        })
        .interact_text()?;
    Ok(parse_menu_choice(&answer).unwrap_or(MenuChoice::Exit))
}
