//! Change-feed pages
//!
//! A delta query is delivered as a sequence of pages. Every page except the
//! last carries a `nextLink`; the last carries a `deltaLink` whose URL is the
//! starting token for the next sync cycle.

use super::item::Item;

/// How a delta page continues
///
/// Modelled as an enum so a page can never hand the caller both a next link
/// and a delta link at the same time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaContinuation {
    /// More pages are pending in this cycle; fetch this URL next
    Next(String),
    /// The page is terminal; this URL is the token for the next cycle
    Delta(String),
    /// The server returned neither link
    Missing,
}

impl DeltaContinuation {
    /// Builds the continuation from the raw `@odata.nextLink` /
    /// `@odata.deltaLink` pair. Empty strings count as absent and a next link
    /// takes precedence over a delta link.
    pub fn from_links(next_link: Option<String>, delta_link: Option<String>) -> Self {
        match (
            next_link.filter(|l| !l.is_empty()),
            delta_link.filter(|l| !l.is_empty()),
        ) {
            (Some(next), _) => Self::Next(next),
            (None, Some(delta)) => Self::Delta(delta),
            (None, None) => Self::Missing,
        }
    }

    /// The next link, if more pages are pending
    pub fn next_link(&self) -> Option<&str> {
        match self {
            Self::Next(link) => Some(link),
            _ => None,
        }
    }

    /// The delta link, if the page is terminal
    pub fn delta_link(&self) -> Option<&str> {
        match self {
            Self::Delta(link) => Some(link),
            _ => None,
        }
    }
}

/// One normalized page of change-feed results
#[derive(Debug, Clone)]
pub struct DeltaPage {
    /// Items in server order after normalization
    pub items: Vec<Item>,
    pub continuation: DeltaContinuation,
}

/// Result of following a change feed to its end
#[derive(Debug, Clone, Default)]
pub struct DeltaSync {
    /// Items accumulated across every page, in page order
    pub items: Vec<Item>,
    /// Token for the next cycle; empty when the feed ended without a delta link
    pub next_token: String,
}
