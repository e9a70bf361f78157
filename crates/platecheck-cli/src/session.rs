//! Line-oriented chat session on stdin/stdout.
//!
//! Stands in for a chat front end: `/plate` posts a summary, `/details`
//! plays the part of the expand reaction.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use platecheck_core::candidate::{CandidateProducer, ChatCommand, PLATE_USAGE, TypedText};
use platecheck_core::lookup::{LookupReporter, LookupService};
use platecheck_core::report::{HELP_TEXT, format_detail, format_summary};
use platecheck_core::traits::PlateSource;

const GREETING: &str = "Type /help for commands.";
const EXPIRED_INTERACTION: &str =
    "Nothing to show for that id: it expired or was already expanded.";

/// Run commands from `input` until `/quit` or end of input.
pub async fn run<A, B, R, In, Out>(
    lookup: &LookupService<A, B>,
    reporter: &R,
    input: In,
    output: &mut Out,
) -> Result<()>
where
    A: PlateSource,
    B: PlateSource,
    R: LookupReporter,
    In: AsyncBufRead + Unpin,
    Out: AsyncWrite + Unpin,
{
    write_reply(output, GREETING).await?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = ChatCommand::parse(&line) else {
            continue;
        };
        let reply = match command {
            ChatCommand::Quit => break,
            ChatCommand::Help => HELP_TEXT.to_string(),
            ChatCommand::Usage(usage) => usage.to_string(),
            ChatCommand::Unknown(name) => format!("Unknown command {name}. {GREETING}"),
            ChatCommand::Plate(raw) => plate_reply(lookup, reporter, &raw).await,
            ChatCommand::Details(id) => match lookup.expand(id, reporter).await {
                Some(report) => format_detail(&report),
                None => EXPIRED_INTERACTION.to_string(),
            },
        };
        write_reply(output, &reply).await?;
    }
    Ok(())
}

async fn plate_reply<A, B, R>(lookup: &LookupService<A, B>, reporter: &R, raw: &str) -> String
where
    A: PlateSource,
    B: PlateSource,
    R: LookupReporter,
{
    let candidates = match TypedText.produce(raw).await {
        Ok(candidates) => candidates,
        Err(e) => return format!("Invalid plate: {e}. {PLATE_USAGE}"),
    };

    let mut replies = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let summary = lookup.search(candidate, reporter).await;
        let mut reply = format_summary(&summary);
        if let Some(id) = summary.interaction {
            reply.push_str(&format!("\n(/details {id})"));
        }
        replies.push(reply);
    }
    replies.join("\n\n")
}

async fn write_reply<Out: AsyncWrite + Unpin>(output: &mut Out, reply: &str) -> Result<()> {
    output.write_all(reply.as_bytes()).await?;
    output.write_all(b"\n\n").await?;
    output.flush().await?;
    Ok(())
}
