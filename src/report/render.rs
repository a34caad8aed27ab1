//! Text and JSON rendering.
//!
//! JSON output uses the envelopes `{"success": true, "result": ...}`,
//! `{"success": true, "history": [...]}` and
//! `{"success": true, "message": "History cleared"}`.

use crate::cli::OutputFormat;
use crate::models::{Exchange, Response};
use anyhow::Result;
use serde::Serialize;

#[derive(Serialize)]
struct ResultEnvelope<'a> {
    success: bool,
    result: &'a Response,
}

#[derive(Serialize)]
struct HistoryEnvelope<'a> {
    success: bool,
    history: &'a [Exchange],
}

#[derive(Serialize)]
struct MessageEnvelope<'a> {
    success: bool,
    message: &'a str,
}

/// Render an answer.
pub fn render_response(response: &Response, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(&ResultEnvelope {
            success: true,
            result: response,
        }),
        OutputFormat::Text => match response {
            Response::Text(text) => Ok(text.clone()),
            Response::Structured(map) => serde_json::to_string_pretty(map).map_err(Into::into),
        },
    }
}

/// Render a session's history, oldest first.
pub fn render_history(history: &[Exchange], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return to_json(&HistoryEnvelope {
            success: true,
            history,
        });
    }

    if history.is_empty() {
        return Ok("No conversation history yet.".to_string());
    }

    let mut output = String::new();
    output.push_str("Conversation History:\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');

    for (i, exchange) in history.iter().enumerate() {
        let n = i + 1;
        output.push_str(&format!(
            "[{}] Q{}: {}\n",
            exchange.recorded_at.format("%H:%M:%S"),
            n,
            exchange.query
        ));
        output.push_str(&format!("A{}: {}\n", n, preview(&exchange.response.to_text(), 200)));
        output.push_str(&"-".repeat(40));
        output.push('\n');
    }

    Ok(output.trim_end().to_string())
}

/// Render the confirmation for a cleared session.
pub fn render_cleared(format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(&MessageEnvelope {
            success: true,
            message: "History cleared",
        }),
        OutputFormat::Text => Ok("Conversation history cleared.".to_string()),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(output: &str) -> Value {
        serde_json::from_str(output).unwrap()
    }

    #[test]
    fn test_json_result_envelope() {
        let output = render_response(&Response::from("42 people"), OutputFormat::Json).unwrap();
        assert_eq!(parse(&output), json!({"success": true, "result": "42 people"}));
    }

    #[test]
    fn test_text_structured_is_pretty_json() {
        let response = Response::failure("No images found in r.docx");
        let output = render_response(&response, OutputFormat::Text).unwrap();
        assert!(output.contains("\n"));
        assert_eq!(parse(&output)["error"], json!("No images found in r.docx"));
    }

    #[test]
    fn test_history_json() {
        let history = vec![Exchange::new("q1", Response::from("a1"))];
        let output = render_history(&history, OutputFormat::Json).unwrap();
        let value = parse(&output);

        assert_eq!(value["success"], json!(true));
        assert_eq!(value["history"][0]["query"], json!("q1"));
        assert_eq!(value["history"][0]["response"], json!("a1"));
        assert!(value["history"][0]["recorded_at"].is_string());
    }

    #[test]
    fn test_history_text() {
        assert_eq!(
            render_history(&[], OutputFormat::Text).unwrap(),
            "No conversation history yet."
        );

        let history = vec![
            Exchange::new("q1", Response::from("a1")),
            Exchange::new("q2", Response::from("x".repeat(300))),
        ];
        let output = render_history(&history, OutputFormat::Text).unwrap();
        assert!(output.contains("Q1: q1\nA1: a1\n"));
        assert!(output.contains(&format!("A2: {}...", "x".repeat(200))));
    }

    #[test]
    fn test_cleared() {
        let output = render_cleared(OutputFormat::Json).unwrap();
        assert_eq!(
            parse(&output),
            json!({"success": true, "message": "History cleared"})
        );
    }
}
