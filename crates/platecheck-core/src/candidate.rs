use std::future::Future;

use uuid::Uuid;

use crate::models::{CandidateError, CandidateOrigin, PlateCandidate};

/// Something that turns user input into plate candidates.
///
/// Typed text is handled here; image OCR and voice transcription live
/// outside this crate and implement the same trait.
pub trait CandidateProducer: Send + Sync {
    type Input: ?Sized + Sync;

    fn origin(&self) -> CandidateOrigin;

    fn produce(
        &self,
        input: &Self::Input,
    ) -> impl Future<Output = Result<Vec<PlateCandidate>, CandidateError>> + Send;
}

/// Candidates from a typed plate string. Always exactly one on success.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypedText;

impl CandidateProducer for TypedText {
    type Input = str;

    fn origin(&self) -> CandidateOrigin {
        CandidateOrigin::Typed
    }

    async fn produce(&self, input: &str) -> Result<Vec<PlateCandidate>, CandidateError> {
        Ok(vec![PlateCandidate::new(input, self.origin())?])
    }
}

pub const PLATE_USAGE: &str = "Usage: /plate ABC123";
pub const DETAILS_USAGE: &str = "Usage: /details <id from a previous match>";

/// A command line typed into a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Raw plate text, not yet validated.
    Plate(String),
    Details(Uuid),
    Help,
    Quit,
    /// Recognized command with missing or bad arguments.
    Usage(&'static str),
    Unknown(String),
}

impl ChatCommand {
    /// `None` for lines that are not commands at all.
    pub fn parse(line: &str) -> Option<ChatCommand> {
        let line = line.trim();
        if !line.starts_with('/') {
            return None;
        }
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "/plate" if rest.is_empty() => ChatCommand::Usage(PLATE_USAGE),
            "/plate" => ChatCommand::Plate(rest.to_string()),
            "/details" => match Uuid::parse_str(rest) {
                Ok(id) => ChatCommand::Details(id),
                Err(_) => ChatCommand::Usage(DETAILS_USAGE),
            },
            "/help" => ChatCommand::Help,
            "/quit" | "/exit" => ChatCommand::Quit,
            _ => ChatCommand::Unknown(name.to_string()),
        };
        Some(command)
    }
}
