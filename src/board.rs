//! Plain-text rendering of a store snapshot.

use std::fmt::Write;

use crate::countdown::{CountdownSet, CountdownView};
use crate::race::{CategoryFilter, RaceSummary};
use crate::store::StoreSnapshot;

fn view_for(race: &RaceSummary, snapshot: &StoreSnapshot, countdowns: &CountdownSet) -> CountdownView {
    countdowns
        .get(&race.race_id)
        .map(|cd| cd.current())
        .unwrap_or_else(|| CountdownView::compute(race.start_secs(), &snapshot.taken_at))
}

fn race_line(race: &RaceSummary, view: &CountdownView) -> String {
    let mut line = format!("R{} {}", race.race_number, race.race_name);
    if let Some(form) = &race.race_form {
        if form.distance > 0 {
            let unit = if form.distance_type.short_name.is_empty() {
                "m"
            } else {
                form.distance_type.short_name.as_str()
            };
            let _ = write!(line, " {}{}", form.distance, unit);
        }
    }
    format!("{:<48} {:>9} [{}]", line, view.text, view.class)
}

pub fn render(snapshot: &StoreSnapshot, countdowns: &CountdownSet) -> String {
    let mut out = String::new();
    let state = &snapshot.state;

    let category = match state.category {
        CategoryFilter::All => "all".to_string(),
        CategoryFilter::Only(c) => c.name().to_string(),
    };
    let _ = writeln!(
        out,
        "== Next races == category: {} | country: {} | available: {}",
        category,
        state.country,
        if snapshot.countries.is_empty() {
            "-".to_string()
        } else {
            snapshot.countries.join(", ")
        }
    );
    if state.loading {
        let _ = writeln!(out, "(refreshing)");
    }
    if let Some(err) = &state.error {
        let _ = writeln!(out, "! {}", err);
    }

    let _ = writeln!(out, "\nNext to go");
    if snapshot.next_to_go.is_empty() {
        let _ = writeln!(out, "  no upcoming races");
    }
    for race in &snapshot.next_to_go {
        let view = view_for(race, snapshot, countdowns);
        let _ = writeln!(out, "  {} @ {}", race_line(race, &view), race.meeting_name);
    }

    if snapshot.grouped.is_empty() {
        let _ = writeln!(out, "\nNo races match the current filters");
    }
    for group in &snapshot.grouped {
        let _ = writeln!(out, "\n{}", group.name);
        for venue in &group.venues {
            if venue.state.is_empty() {
                let _ = writeln!(out, "  {}", venue.venue);
            } else {
                let _ = writeln!(out, "  {}, {}", venue.venue, venue.state);
            }
            for race in &venue.races {
                let view = view_for(race, snapshot, countdowns);
                let _ = writeln!(out, "    {}", race_line(race, &view));
            }
        }
    }
    out
}
