//! Derived views over the raw race list. Pure functions; the store re-runs
//! them on every read.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::race::{Category, CategoryFilter, CategoryGroup, CountryFilter, RaceSummary, VenueGroup};
use crate::time::{category_name, race_status, RaceStatus};

pub const NEXT_TO_GO_LIMIT: usize = 5;

/// Races that have not yet finished.
pub fn active_races(races: &[RaceSummary], now: &DateTime<Utc>) -> Vec<RaceSummary> {
    races
        .iter()
        .filter(|r| race_status(r.start_secs(), now) != RaceStatus::Finished)
        .cloned()
        .collect()
}

/// Country filter first, then category.
pub fn filtered_races(
    active: &[RaceSummary],
    category: CategoryFilter,
    country: &CountryFilter,
) -> Vec<RaceSummary> {
    active
        .iter()
        .filter(|r| country.matches(r))
        .filter(|r| category.matches(r))
        .cloned()
        .collect()
}

pub fn available_countries(active: &[RaceSummary]) -> Vec<String> {
    active
        .iter()
        .map(|r| r.venue_country.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Earliest `limit` races by advertised start.
pub fn next_to_go(active: &[RaceSummary], limit: usize) -> Vec<RaceSummary> {
    let mut sorted = active.to_vec();
    sorted.sort_by_key(|r| r.start_secs());
    sorted.truncate(limit);
    sorted
}

/// Position in the Horse → Greyhound → Harness preference list, `-1` when the
/// id is not in it. Unknown categories therefore sort ahead of known ones.
// TODO: decide whether unknown categories should trail the known ones; the
// board currently shows them first.
pub fn category_rank(category_id: &str) -> i32 {
    Category::ORDER
        .iter()
        .position(|c| c.id() == category_id)
        .map_or(-1, |i| i as i32)
}

/// Partition by category, then by (venue name, venue state).
///
/// Races within a venue are ordered by race number, venues by name, and
/// categories by [`category_rank`]. All sorts are stable, so ties keep
/// first-seen order.
pub fn group_by_category(races: &[RaceSummary]) -> Vec<CategoryGroup> {
    let mut by_category: Vec<(&str, Vec<&RaceSummary>)> = Vec::new();
    for race in races {
        match by_category.iter_mut().find(|(id, _)| *id == race.category_id) {
            Some((_, bucket)) => bucket.push(race),
            None => by_category.push((race.category_id.as_str(), vec![race])),
        }
    }

    let mut groups: Vec<CategoryGroup> = by_category
        .into_iter()
        .map(|(category_id, members)| CategoryGroup {
            name: category_name(category_id).to_string(),
            category_id: category_id.to_string(),
            venues: group_by_venue(members),
        })
        .collect();

    groups.sort_by_key(|g| category_rank(&g.category_id));
    groups
}

fn group_by_venue(races: Vec<&RaceSummary>) -> Vec<VenueGroup> {
    let mut venues: Vec<VenueGroup> = Vec::new();
    for race in races {
        let existing = venues
            .iter_mut()
            .find(|v| v.venue == race.venue_name && v.state == race.venue_state);
        match existing {
            Some(group) => group.races.push(race.clone()),
            None => venues.push(VenueGroup {
                venue: race.venue_name.clone(),
                state: race.venue_state.clone(),
                races: vec![race.clone()],
            }),
        }
    }
    for venue in &mut venues {
        venue.races.sort_by_key(|r| r.race_number);
    }
    venues.sort_by(|a, b| a.venue.cmp(&b.venue));
    venues
}
