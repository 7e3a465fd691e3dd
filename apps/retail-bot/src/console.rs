//! # Console Transport
//!
//! Drives one operator session from stdin.
//!
//! ```text
//! stdin line ──► "#2"           → Select(id of the 2nd offered choice)
//!            ├─► "Finish"       → Select("billing:finish")   (label match)
//!            ├─► "/quit" or EOF → stop
//!            └─► anything else  → Text(line)
//!
//! replies ──► rendered text + numbered choices   (default)
//!         └─► one JSON object per intent         (--json)
//! ```

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::error::BotResult;
use crate::event::InputEvent;
use crate::intent::OutputIntent;
use crate::render::{Choice, Renderer};
use crate::session::SessionKey;

const QUIT: &str = "/quit";

#[derive(Debug, Clone)]
pub struct ConsoleOptions {
    pub user: SessionKey,
    /// Print intents as JSON instead of rendered text.
    pub json: bool,
}

/// Reads stdin until EOF, `/quit` or Ctrl-C.
pub async fn run(
    dispatcher: &Dispatcher,
    renderer: &Renderer,
    options: &ConsoleOptions,
) -> BotResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!(user = %options.user, "Console session started");

    let intents = dispatcher
        .handle(&options.user, InputEvent::text("/start"))
        .await;
    let mut offered = show(&mut stdout, renderer, &intents, options.json).await?;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };

        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case(QUIT) {
            break;
        }

        let intents = dispatcher.handle(&options.user, to_input(line, &offered)).await;
        offered = show(&mut stdout, renderer, &intents, options.json).await?;
    }

    info!(user = %options.user, "Console session ended");
    Ok(())
}

/// Maps a typed line to an input event against the choices last shown.
fn to_input(line: &str, offered: &[Choice]) -> InputEvent {
    if let Some(n) = line.strip_prefix('#').and_then(|n| n.parse::<usize>().ok()) {
        if let Some(choice) = n.checked_sub(1).and_then(|i| offered.get(i)) {
            return InputEvent::select(choice.id.clone());
        }
    }

    if let Some(choice) = offered.iter().find(|c| c.label.eq_ignore_ascii_case(line)) {
        return InputEvent::select(choice.id.clone());
    }

    InputEvent::text(line)
}

/// Prints replies and returns the choices now on offer, numbered from 1.
async fn show(
    out: &mut tokio::io::Stdout,
    renderer: &Renderer,
    intents: &[OutputIntent],
    json: bool,
) -> BotResult<Vec<Choice>> {
    let mut offered = Vec::new();
    let mut buf = String::new();

    for intent in intents {
        let rendered = renderer.render(intent);

        if json {
            buf.push_str(&serde_json::to_string(intent)?);
            buf.push('\n');
        } else {
            buf.push_str(&rendered.text);
            buf.push('\n');
            for (i, choice) in rendered.choices.iter().enumerate() {
                buf.push_str(&format!("  #{} {}\n", offered.len() + i + 1, choice.label));
            }
        }

        offered.extend(rendered.choices);
    }

    if !json {
        buf.push_str("> ");
    }

    out.write_all(buf.as_bytes()).await?;
    out.flush().await?;

    Ok(offered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices() -> Vec<Choice> {
        ["Add item", "Finish", "Cancel"]
            .iter()
            .zip(["billing:add_item", "billing:finish", "flow:cancel"])
            .map(|(label, id)| Choice {
                id: id.to_string(),
                label: label.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_numbered_selection() {
        assert_eq!(to_input("#2", &choices()), InputEvent::select("billing:finish"));
        assert_eq!(to_input("#0", &choices()), InputEvent::text("#0"));
        assert_eq!(to_input("#9", &choices()), InputEvent::text("#9"));
    }

    #[test]
    fn test_label_selection() {
        assert_eq!(to_input("finish", &choices()), InputEvent::select("billing:finish"));
        assert_eq!(to_input("3", &choices()), InputEvent::text("3"));
        assert_eq!(to_input("Finish", &[]), InputEvent::text("Finish"));
    }
}
