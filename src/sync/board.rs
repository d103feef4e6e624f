//! Departure board assembly.
//!
//! Turns a raw provider payload into the snapshot served to clients:
//! filter to the tracked line, sort by time, claim departures into capped
//! groups and top the delivered list up to the configured minimum. All
//! functions here are pure so the whole policy is testable without I/O.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use super::types::{Departure, Snapshot, SnapshotSource};
use crate::config::{BoardConfig, GroupBy, StopConfig};
use crate::providers::sl::SiteDeparturesResponse;

/// Degradation notice carried by synthetic snapshots
pub const SYNTHETIC_DATA_ERROR: &str = "Using demonstration data - live API unavailable";

/// Build a live snapshot from a raw provider payload
pub fn build_snapshot(
    payload: &SiteDeparturesResponse,
    now: DateTime<Tz>,
    stop: &StopConfig,
    board: &BoardConfig,
) -> Snapshot {
    let mut all: Vec<Departure> = payload
        .departures
        .iter()
        .filter(|raw| raw.line_designation() == Some(stop.line.as_str()))
        .map(|raw| Departure {
            line: stop.line.clone(),
            destination: raw
                .destination
                .clone()
                .unwrap_or_else(|| board.unknown_destination.clone()),
            expected_time: raw.expected_time().map(str::to_string),
            direction: raw.direction.clone().unwrap_or_default(),
            real_time: raw.is_real_time(),
        })
        .collect();

    sort_by_time(&mut all);
    let (departures, groups) = group_and_cap(all, board);

    Snapshot {
        departures,
        groups,
        generated_at: now.to_rfc3339(),
        source: SnapshotSource::Live,
        error: None,
    }
}

/// Fixed demonstration departures used when no live source can be reached.
///
/// Deterministic in (`now`, configuration): two departures per expected
/// group at staggered offsets, the first carrying a live estimate and the
/// second only a plan.
pub fn synthetic_snapshot(now: DateTime<Tz>, stop: &StopConfig, board: &BoardConfig) -> Snapshot {
    let mut fabricated = Vec::new();

    for (i, key) in board.expected_groups.iter().enumerate() {
        let first = 4 + 8 * i as i64;
        let offsets = [first, first + 5 + 5 * i as i64];

        for (j, minutes) in offsets.into_iter().enumerate() {
            let (destination, direction) = match board.group_by {
                GroupBy::Destination => (key.clone(), (i + 1).to_string()),
                GroupBy::Direction => (board.unknown_destination.clone(), key.clone()),
            };
            fabricated.push(Departure {
                line: stop.line.clone(),
                destination,
                expected_time: Some((now + Duration::minutes(minutes)).to_rfc3339()),
                direction,
                real_time: j == 0,
            });
        }
    }

    sort_by_time(&mut fabricated);
    let (departures, groups) = group_and_cap(fabricated, board);

    Snapshot {
        departures,
        groups,
        generated_at: now.to_rfc3339(),
        source: SnapshotSource::Synthetic,
        error: Some(SYNTHETIC_DATA_ERROR.to_string()),
    }
}

/// Stable ascending sort on expected_time, entries without a time last.
/// Times within one payload share format and offset, so string order is
/// chronological order.
fn sort_by_time(departures: &mut [Departure]) {
    departures.sort_by(|a, b| match (&a.expected_time, &b.expected_time) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Claim time-sorted departures into disjoint capped groups, then build the
/// delivered list: group members first, topped up from the unclaimed
/// remainder (earliest first) until the configured minimum is reached or
/// the pool runs out. Topped-up entries stay out of the groups.
fn group_and_cap(
    all: Vec<Departure>,
    board: &BoardConfig,
) -> (Vec<Departure>, BTreeMap<String, Vec<Departure>>) {
    let mut included = vec![false; all.len()];
    let mut groups = BTreeMap::new();
    let mut delivered: Vec<Departure> = Vec::new();

    for key in &board.expected_groups {
        let mut members = Vec::new();
        for (idx, departure) in all.iter().enumerate() {
            if members.len() >= board.per_group {
                break;
            }
            if !included[idx] && group_matches(board.group_by, key, departure) {
                included[idx] = true;
                members.push(departure.clone());
            }
        }
        delivered.extend(members.iter().cloned());
        groups.insert(key.clone(), members);
    }

    if delivered.len() < board.min_total {
        let mut missing = board.min_total - delivered.len();
        for (idx, departure) in all.iter().enumerate() {
            if missing == 0 {
                break;
            }
            if !included[idx] {
                included[idx] = true;
                delivered.push(departure.clone());
                missing -= 1;
            }
        }
    }

    sort_by_time(&mut delivered);
    (delivered, groups)
}

fn group_matches(group_by: GroupBy, key: &str, departure: &Departure) -> bool {
    match group_by {
        // Loose match so "Fridhemsplan" also catches variants like
        // "Fridhemsplan via Västerbroplan"
        GroupBy::Destination => departure
            .destination
            .to_lowercase()
            .contains(&key.to_lowercase()),
        GroupBy::Direction => departure.direction == key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::sl::{ApiDeparture, LineRef};
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Tz> {
        chrono_tz::Europe::Stockholm
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .unwrap()
    }

    fn iso(offset_min: i64) -> String {
        (fixed_now() + Duration::minutes(offset_min)).to_rfc3339()
    }

    fn raw(line: &str, destination: &str, offset_min: i64) -> ApiDeparture {
        ApiDeparture {
            line: Some(LineRef::Name(line.to_string())),
            destination: Some(destination.to_string()),
            expected: Some(iso(offset_min)),
            planned: None,
            direction: Some("1".to_string()),
        }
    }

    fn payload(departures: Vec<ApiDeparture>) -> SiteDeparturesResponse {
        SiteDeparturesResponse { departures }
    }

    fn defaults() -> (StopConfig, BoardConfig) {
        (StopConfig::default(), BoardConfig::default())
    }

    fn times(departures: &[Departure]) -> Vec<Option<String>> {
        departures.iter().map(|d| d.expected_time.clone()).collect()
    }

    // --- normalization tests ---

    #[test]
    fn keeps_only_the_tracked_line() {
        let (stop, board) = defaults();
        let snapshot = build_snapshot(
            &payload(vec![
                raw("1", "Fridhemsplan", 2),
                raw("4", "Radiohuset", 3),
                raw("1", "Stora Essingen", 5),
            ]),
            fixed_now(),
            &stop,
            &board,
        );

        assert_eq!(snapshot.departures.len(), 2);
        assert!(snapshot.departures.iter().all(|d| d.line == "1"));
        assert_eq!(snapshot.source, SnapshotSource::Live);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.generated_at, fixed_now().to_rfc3339());
    }

    #[test]
    fn missing_fields_get_placeholders() {
        let (stop, board) = defaults();
        let bare = ApiDeparture {
            line: Some(LineRef::Name("1".to_string())),
            destination: None,
            expected: None,
            planned: Some(iso(7)),
            direction: None,
        };
        let snapshot = build_snapshot(&payload(vec![bare]), fixed_now(), &stop, &board);

        let dep = &snapshot.departures[0];
        assert_eq!(dep.destination, "Okänd destination");
        assert_eq!(dep.direction, "");
        assert_eq!(dep.expected_time, Some(iso(7)));
        assert!(!dep.real_time);
    }

    #[test]
    fn live_estimate_wins_over_plan_and_sets_real_time() {
        let (stop, board) = defaults();
        let mut with_both = raw("1", "Fridhemsplan", 3);
        with_both.planned = Some(iso(2));
        let snapshot = build_snapshot(&payload(vec![with_both]), fixed_now(), &stop, &board);

        let dep = &snapshot.departures[0];
        assert_eq!(dep.expected_time, Some(iso(3)));
        assert!(dep.real_time);
    }

    // --- ordering tests ---

    #[test]
    fn delivered_list_is_sorted_with_absent_times_last() {
        let (stop, board) = defaults();
        let mut timeless = raw("1", "Fridhemsplan", 0);
        timeless.expected = None;
        timeless.planned = None;

        let snapshot = build_snapshot(
            &payload(vec![
                raw("1", "Stora Essingen", 9),
                timeless,
                raw("1", "Fridhemsplan", 2),
            ]),
            fixed_now(),
            &stop,
            &board,
        );

        assert_eq!(
            times(&snapshot.departures),
            vec![Some(iso(2)), Some(iso(9)), None]
        );
    }

    #[test]
    fn equal_times_keep_group_processing_order() {
        let (stop, board) = defaults();
        // Input order reversed relative to the configured key order
        let snapshot = build_snapshot(
            &payload(vec![
                raw("1", "Stora Essingen", 5),
                raw("1", "Fridhemsplan", 5),
            ]),
            fixed_now(),
            &stop,
            &board,
        );

        assert_eq!(snapshot.departures[0].destination, "Fridhemsplan");
        assert_eq!(snapshot.departures[1].destination, "Stora Essingen");
    }

    // --- grouping and capacity tests ---

    #[test]
    fn groups_keep_the_earliest_departures_up_to_the_cap() {
        let (stop, board) = defaults();
        let snapshot = build_snapshot(
            &payload(vec![
                raw("1", "Fridhemsplan", 12),
                raw("1", "Fridhemsplan", 2),
                raw("1", "Fridhemsplan", 7),
            ]),
            fixed_now(),
            &stop,
            &board,
        );

        let group = &snapshot.groups["Fridhemsplan"];
        assert_eq!(times(group), vec![Some(iso(2)), Some(iso(7))]);
    }

    #[test]
    fn destination_keys_match_case_insensitive_substrings() {
        let (stop, board) = defaults();
        let snapshot = build_snapshot(
            &payload(vec![
                raw("1", "FRIDHEMSPLAN", 2),
                raw("1", "Fridhemsplan via Västerbroplan", 5),
            ]),
            fixed_now(),
            &stop,
            &board,
        );

        assert_eq!(snapshot.groups["Fridhemsplan"].len(), 2);
    }

    #[test]
    fn direction_keys_match_exactly() {
        let stop = StopConfig::default();
        let board = BoardConfig {
            group_by: GroupBy::Direction,
            expected_groups: vec!["1".to_string(), "2".to_string()],
            ..BoardConfig::default()
        };

        let mut southbound = raw("1", "Stora Essingen", 3);
        southbound.direction = Some("2".to_string());
        let mut odd = raw("1", "Fridhemsplan", 5);
        odd.direction = Some("11".to_string());

        let snapshot = build_snapshot(
            &payload(vec![raw("1", "Fridhemsplan", 2), southbound, odd]),
            fixed_now(),
            &stop,
            &board,
        );

        assert_eq!(snapshot.groups["1"].len(), 1);
        assert_eq!(snapshot.groups["2"].len(), 1);
        // "11" is not direction "1", it only reaches the board as backfill
        assert_eq!(snapshot.departures.len(), 3);
    }

    #[test]
    fn every_expected_key_is_present_even_when_empty() {
        let (stop, board) = defaults();
        let snapshot = build_snapshot(&payload(vec![]), fixed_now(), &stop, &board);

        assert_eq!(snapshot.groups.len(), 2);
        assert!(snapshot.groups["Fridhemsplan"].is_empty());
        assert!(snapshot.groups["Stora Essingen"].is_empty());
        assert!(snapshot.departures.is_empty());
    }

    #[test]
    fn a_departure_is_claimed_by_the_first_matching_key_only() {
        let stop = StopConfig::default();
        let board = BoardConfig {
            expected_groups: vec!["Essingen".to_string(), "Stora Essingen".to_string()],
            ..BoardConfig::default()
        };
        let snapshot = build_snapshot(
            &payload(vec![raw("1", "Stora Essingen", 4)]),
            fixed_now(),
            &stop,
            &board,
        );

        assert_eq!(snapshot.groups["Essingen"].len(), 1);
        assert!(snapshot.groups["Stora Essingen"].is_empty());
        assert_eq!(snapshot.departures.len(), 1);
    }

    // --- backfill tests ---

    #[test]
    fn backfill_tops_up_to_the_minimum_from_the_earliest_leftovers() {
        let (stop, board) = defaults();
        let snapshot = build_snapshot(
            &payload(vec![
                raw("1", "Fridhemsplan", 2),
                raw("1", "Fridhemsplan", 5),
                raw("1", "Fridhemsplan", 9),
                raw("1", "Stora Essingen", 3),
            ]),
            fixed_now(),
            &stop,
            &board,
        );

        // Caps leave 3 grouped departures, one more is pulled in
        assert_eq!(
            times(&snapshot.departures),
            vec![Some(iso(2)), Some(iso(3)), Some(iso(5)), Some(iso(9))]
        );
        // The backfilled +9 does not join its group
        assert_eq!(
            times(&snapshot.groups["Fridhemsplan"]),
            vec![Some(iso(2)), Some(iso(5))]
        );
        assert_eq!(times(&snapshot.groups["Stora Essingen"]), vec![Some(iso(3))]);
    }

    #[test]
    fn no_backfill_once_the_minimum_is_met() {
        let stop = StopConfig::default();
        let board = BoardConfig {
            min_total: 3,
            ..BoardConfig::default()
        };
        let snapshot = build_snapshot(
            &payload(vec![
                raw("1", "Fridhemsplan", 2),
                raw("1", "Fridhemsplan", 5),
                raw("1", "Fridhemsplan", 9),
                raw("1", "Stora Essingen", 3),
            ]),
            fixed_now(),
            &stop,
            &board,
        );

        assert_eq!(
            times(&snapshot.departures),
            vec![Some(iso(2)), Some(iso(3)), Some(iso(5))]
        );
    }

    #[test]
    fn backfill_stops_when_the_pool_is_exhausted() {
        let (stop, board) = defaults();
        let snapshot = build_snapshot(
            &payload(vec![raw("1", "Fridhemsplan", 2), raw("1", "Alvik", 6)]),
            fixed_now(),
            &stop,
            &board,
        );

        // Only two departures exist, minimum 4 cannot be reached
        assert_eq!(snapshot.departures.len(), 2);
        // The unexpected destination is delivered but belongs to no group
        assert!(snapshot
            .groups
            .values()
            .all(|members| members.iter().all(|d| d.destination != "Alvik")));
    }

    // --- determinism tests ---

    #[test]
    fn same_payload_and_clock_build_identical_snapshots() {
        let (stop, board) = defaults();
        let input = payload(vec![
            raw("1", "Fridhemsplan", 2),
            raw("1", "Stora Essingen", 3),
            raw("1", "Fridhemsplan", 5),
        ]);

        let first = build_snapshot(&input, fixed_now(), &stop, &board);
        let second = build_snapshot(&input, fixed_now(), &stop, &board);
        assert_eq!(first, second);
    }

    // --- synthetic dataset tests ---

    #[test]
    fn synthetic_reproduces_the_demonstration_dataset() {
        let (stop, board) = defaults();
        let snapshot = synthetic_snapshot(fixed_now(), &stop, &board);

        assert_eq!(snapshot.source, SnapshotSource::Synthetic);
        assert_eq!(snapshot.error.as_deref(), Some(SYNTHETIC_DATA_ERROR));
        assert_eq!(snapshot.generated_at, fixed_now().to_rfc3339());

        assert_eq!(
            times(&snapshot.departures),
            vec![Some(iso(4)), Some(iso(9)), Some(iso(12)), Some(iso(22))]
        );
        let destinations: Vec<&str> = snapshot
            .departures
            .iter()
            .map(|d| d.destination.as_str())
            .collect();
        assert_eq!(
            destinations,
            vec!["Fridhemsplan", "Fridhemsplan", "Stora Essingen", "Stora Essingen"]
        );
        let directions: Vec<&str> = snapshot
            .departures
            .iter()
            .map(|d| d.direction.as_str())
            .collect();
        assert_eq!(directions, vec!["1", "1", "2", "2"]);
        let flags: Vec<bool> = snapshot.departures.iter().map(|d| d.real_time).collect();
        assert_eq!(flags, vec![true, false, true, false]);

        assert_eq!(snapshot.groups["Fridhemsplan"].len(), 2);
        assert_eq!(snapshot.groups["Stora Essingen"].len(), 2);
        assert!(snapshot.departures.iter().all(|d| d.line == "1"));
    }

    #[test]
    fn synthetic_is_deterministic_for_a_fixed_clock() {
        let (stop, board) = defaults();
        assert_eq!(
            synthetic_snapshot(fixed_now(), &stop, &board),
            synthetic_snapshot(fixed_now(), &stop, &board)
        );
    }

    #[test]
    fn synthetic_under_direction_grouping_uses_keys_as_directions() {
        let stop = StopConfig::default();
        let board = BoardConfig {
            group_by: GroupBy::Direction,
            expected_groups: vec!["1".to_string(), "2".to_string()],
            ..BoardConfig::default()
        };
        let snapshot = synthetic_snapshot(fixed_now(), &stop, &board);

        assert_eq!(snapshot.departures.len(), 4);
        assert!(snapshot
            .departures
            .iter()
            .all(|d| d.destination == "Okänd destination"));
        assert_eq!(snapshot.groups["1"].len(), 2);
        assert_eq!(snapshot.groups["2"].len(), 2);
    }
}
