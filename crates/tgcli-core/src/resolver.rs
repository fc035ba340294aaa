//! Chat/user reference resolution.
//!
//! A reference is whatever the user typed: `me`, `@username`, `+phone`, a numeric id,
//! or a fragment of a display name. Resolution walks an ordered list of strategies and
//! stops at the first one that produces an entity.

use futures::TryStreamExt;
use regex::Regex;
use tracing::debug;

use crate::{
    domain::{Dialog, Entity},
    errors::Error,
    ports::Transport,
    Result,
};

/// One way of turning a reference into an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// `me` → the authenticated account.
    SelfReference,
    /// `@username`, `+phone`, numeric id → the transport's own resolver.
    DirectLookup,
    /// Case-insensitive substring match against dialog names, ranked.
    DialogScan,
}

/// Strategies in the order they are tried.
pub const STRATEGIES: [Strategy; 3] = [
    Strategy::SelfReference,
    Strategy::DirectLookup,
    Strategy::DialogScan,
];

impl Strategy {
    /// `Ok(None)` means "not mine / no match", try the next strategy.
    pub async fn attempt<T>(self, transport: &T, reference: &str) -> Result<Option<Entity>>
    where
        T: Transport + ?Sized,
    {
        match self {
            Self::SelfReference => {
                if !reference.eq_ignore_ascii_case("me") {
                    return Ok(None);
                }
                transport.get_self().await.map(Some)
            }
            Self::DirectLookup => {
                if !is_direct_reference(reference) {
                    return Ok(None);
                }
                match transport.resolve_reference(reference).await {
                    Ok(entity) => Ok(Some(entity)),
                    Err(e @ Error::Unauthorized(_)) => Err(e),
                    Err(e) => {
                        debug!(reference, error = %e, "direct lookup failed; scanning dialogs");
                        Ok(None)
                    }
                }
            }
            Self::DialogScan => {
                let dialogs = transport.iter_dialogs();
                let best = best_dialog_match(dialogs, reference).await?;
                Ok(best.map(|d| d.entity))
            }
        }
    }
}

/// Resolve `reference` to exactly one entity or fail with `Error::NotFound`.
pub async fn resolve_entity<T>(transport: &T, reference: &str) -> Result<Entity>
where
    T: Transport + ?Sized,
{
    let needle = reference.trim();
    if needle.is_empty() {
        return Err(Error::not_found(reference));
    }

    for strategy in STRATEGIES {
        if let Some(entity) = strategy.attempt(transport, needle).await? {
            debug!(reference = needle, ?strategy, name = %entity.display_name(), "resolved");
            return Ok(entity);
        }
    }

    Err(Error::not_found(reference))
}

/// `@username`, `+phone`, or an optionally negative integer id.
pub fn is_direct_reference(reference: &str) -> bool {
    if reference.starts_with('@') || reference.starts_with('+') {
        return true;
    }
    let numeric = Regex::new(r"^-?\d+$").expect("valid regex");
    numeric.is_match(reference)
}

/// Rank key for a dialog name against a lowercase needle; lower sorts first.
///
/// `None` when the name does not contain the needle at all.
fn rank(name: &str, needle: &str) -> Option<(bool, bool, usize)> {
    let lower = name.to_lowercase();
    if !lower.contains(needle) {
        return None;
    }
    Some((
        lower != needle,
        !lower.starts_with(needle),
        name.chars().count(),
    ))
}

/// Scan the whole dialog stream and keep the best-ranked match.
///
/// Ties on the rank key keep the first-encountered dialog.
async fn best_dialog_match<S>(mut dialogs: S, reference: &str) -> Result<Option<Dialog>>
where
    S: futures::Stream<Item = Result<Dialog>> + Unpin,
{
    let needle = reference.to_lowercase();
    let mut best: Option<((bool, bool, usize), Dialog)> = None;

    while let Some(dialog) = dialogs.try_next().await? {
        let Some(key) = rank(&dialog.name, &needle) else {
            continue;
        };
        let better = match &best {
            Some((best_key, _)) => key < *best_key,
            None => true,
        };
        if better {
            best = Some((key, dialog));
        }
    }

    Ok(best.map(|(_, d)| d))
}
