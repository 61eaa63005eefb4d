//! Resolution of "has every one of these labels" constraints.
//!
//! Engines differ in their set-intersection syntax, so the match-all join is
//! done here: fetch every label row whose name is required, group by frame
//! and keep the frames that matched each required name.

use crate::error::MetadataResult;
use crate::models::FrameLabelRow;
use crate::query::{Column, SelectQuery, Table, Values};
use crate::repos::FrameRepo;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Ids of the frames carrying every label in `required`.
///
/// Callers skip label resolution entirely when no labels are required; an
/// empty `required` set resolves to no frames without touching the store.
pub async fn resolve_frame_ids_for_labels<R: FrameRepo + ?Sized>(
    repo: &R,
    required: &BTreeSet<String>,
) -> MetadataResult<HashSet<String>> {
    if required.is_empty() {
        return Ok(HashSet::new());
    }

    let mut query = SelectQuery::from(Table::FrameLabel);
    query.filter_in(Column::Name, Values::Text(required.iter().cloned().collect()));

    let rows = repo.fetch_labels(&query).await?;
    let matched = match_all(&rows, required);

    tracing::debug!(
        required = required.len(),
        label_rows = rows.len(),
        matched = matched.len(),
        "Resolved label constraint"
    );

    Ok(matched)
}

/// Group label rows by frame and keep frames that matched every required
/// name. Names are counted once per frame, so duplicate rows cannot make a
/// frame look like it carries a label it lacks.
pub fn match_all(rows: &[FrameLabelRow], required: &BTreeSet<String>) -> HashSet<String> {
    if required.is_empty() {
        return HashSet::new();
    }

    let mut matched: HashMap<&str, HashSet<&str>> = HashMap::new();
    for row in rows.iter().filter(|row| required.contains(&row.name)) {
        matched
            .entry(row.frame_id.as_str())
            .or_default()
            .insert(row.name.as_str());
    }

    matched
        .into_iter()
        .filter(|(_, names)| names.len() == required.len())
        .map(|(frame_id, _)| frame_id.to_string())
        .collect()
}
