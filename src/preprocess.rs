use futures::future::try_join_all;

use crate::document::Schedule;
use crate::errors::ResolutionError;
use crate::yle::Resolve;

/// Replaces the program ID of every YLE item with a playable URL.
///
/// Resolutions run concurrently. Items keep their order and every other
/// item is left untouched. A single failed resolution fails the whole
/// schedule; nothing is partially substituted.
pub async fn resolve_schedule(
    resolver: &dyn Resolve,
    mut schedule: Schedule,
) -> Result<Schedule, ResolutionError> {
    let programs: Vec<(usize, String)> = schedule
        .items
        .iter_mut()
        .enumerate()
        .filter_map(|(index, item)| item.yle_program_mut().map(|id| (index, id.clone())))
        .collect();

    if programs.is_empty() {
        return Ok(schedule);
    }

    let urls = try_join_all(programs.iter().map(|(_, id)| resolver.resolve(id))).await?;

    for ((index, _), url) in programs.iter().zip(urls) {
        if let Some(slot) = schedule.items[*index].yle_program_mut() {
            *slot = url;
        }
    }

    Ok(schedule)
}
