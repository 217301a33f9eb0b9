use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::Regex;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{ClinicLocation, SchedulingError, Slot};
use crate::services::dentalink::{DentalinkClient, SLOT_MINUTES};
use crate::services::directory::ClinicDirectory;

/// Weekday windows used when a location's hours string cannot be parsed.
/// Saturdays have no default: unparsable Saturday hours mean closed.
fn default_weekday_window(location: ClinicLocation) -> (NaiveTime, NaiveTime) {
    match location {
        ClinicLocation::Rodadero => (
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        ),
        ClinicLocation::Manzanares => (
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        ),
    }
}

fn default_hours_string(location: ClinicLocation) -> &'static str {
    match location {
        ClinicLocation::Rodadero => "L-V 08:00–18:00; Sáb 08:00–13:00; Festivos: cerrado",
        ClinicLocation::Manzanares => "L-V 08:00–17:00; Sáb 08:00–12:00; Festivos: cerrado",
    }
}

fn weekday_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"L-V\s+(\d{2}:\d{2})\s*(?:–|-)\s*(\d{2}:\d{2})").unwrap()
    })
}

fn saturday_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Sáb\s+(\d{2}:\d{2})\s*(?:–|-)\s*(\d{2}:\d{2})").unwrap()
    })
}

/// Parses the opening window for one weekday out of a business-hours string
/// of the form "L-V 08:00–18:00; Sáb 08:00–13:00; Festivos: cerrado".
/// Sundays are always closed.
pub fn parse_day_window(hours: &str, weekday: Weekday) -> Option<(NaiveTime, NaiveTime)> {
    let pattern = match weekday {
        Weekday::Sun => return None,
        Weekday::Sat => saturday_pattern(),
        _ => weekday_pattern(),
    };

    let captures = pattern.captures(hours)?;
    let start = NaiveTime::parse_from_str(&captures[1], "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(&captures[2], "%H:%M").ok()?;
    if end <= start {
        return None;
    }
    Some((start, end))
}

/// Generates fixed-interval slots from parsed business hours across a date
/// window. Mirrors the external agenda's shape so callers stay path-agnostic.
pub fn generate_local_slots(
    hours_by_location: &HashMap<ClinicLocation, String>,
    from: NaiveDate,
    days_ahead: u32,
    location_filter: Option<ClinicLocation>,
) -> Vec<Slot> {
    let mut slots = Vec::new();

    for offset in 0..days_ahead {
        let date = from + Duration::days(offset as i64);
        let weekday = date.weekday();
        if weekday == Weekday::Sun {
            continue;
        }

        for location in ClinicLocation::ALL {
            if location_filter.is_some_and(|filter| filter != location) {
                continue;
            }

            let hours = hours_by_location
                .get(&location)
                .map(String::as_str)
                .unwrap_or_else(|| default_hours_string(location));

            let window = parse_day_window(hours, weekday).or_else(|| {
                // Unparsable weekday hours fall back to the default window;
                // Saturdays without a parsable window stay closed.
                (weekday != Weekday::Sat).then(|| default_weekday_window(location))
            });

            let Some((start, end)) = window else {
                continue;
            };

            let mut time = start;
            while time < end {
                slots.push(Slot {
                    date,
                    time,
                    location,
                });
                time = time + Duration::minutes(SLOT_MINUTES);
            }
        }
    }

    slots
}

pub struct AvailabilityService {
    dentalink: DentalinkClient,
    directory: Arc<ClinicDirectory>,
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig, directory: Arc<ClinicDirectory>) -> Self {
        Self {
            dentalink: DentalinkClient::new(config),
            directory,
            supabase: SupabaseClient::new(config),
        }
    }

    /// Open slots for a date window, optionally narrowed to one location.
    /// Tries the Dentalink agenda first; an error or an empty agenda falls
    /// back to slots generated from the configured business hours. Both
    /// paths return the same shape.
    pub async fn get_available_slots(
        &self,
        from: NaiveDate,
        location: Option<ClinicLocation>,
        days_ahead: u32,
    ) -> Vec<Slot> {
        match self.agenda_slots(from, location, days_ahead).await {
            Ok(slots) if !slots.is_empty() => {
                debug!("Dentalink agenda returned {} open slots", slots.len());
                slots
            }
            Ok(_) => {
                warn!("Dentalink agenda empty, generating local slots");
                self.local_slots(from, location, days_ahead).await
            }
            Err(e) => {
                warn!("Dentalink unavailable ({}), generating local slots", e);
                self.local_slots(from, location, days_ahead).await
            }
        }
    }

    /// True if the exact (date, time, location) triple is currently open.
    pub async fn is_slot_available(&self, slot: &Slot) -> bool {
        self.get_available_slots(slot.date, Some(slot.location), 1)
            .await
            .iter()
            .any(|candidate| candidate == slot)
    }

    async fn agenda_slots(
        &self,
        from: NaiveDate,
        location: Option<ClinicLocation>,
        days_ahead: u32,
    ) -> Result<Vec<Slot>, SchedulingError> {
        let snapshot = self.directory.get_or_refresh().await?;

        let Some(dentist_id) = snapshot.default_dentist_id else {
            warn!("No dentist configured, cannot query agendas");
            return Ok(Vec::new());
        };
        if snapshot.branch_by_location.is_empty() {
            warn!("No branches configured, cannot query agendas");
            return Ok(Vec::new());
        }

        let locations: Vec<ClinicLocation> = match location {
            Some(single) => vec![single],
            None => snapshot.branch_by_location.keys().copied().collect(),
        };

        let mut slots = Vec::new();
        for offset in 0..days_ahead {
            let date = from + Duration::days(offset as i64);

            for &loc in &locations {
                let Some(branch_id) = snapshot.branch_by_location.get(&loc).copied() else {
                    continue;
                };

                let rows = self.dentalink.agenda_for_day(branch_id, dentist_id, date).await?;
                debug!("Agenda {} at {}: {} rows", date, loc, rows.len());

                for row in rows.into_iter().filter(|row| row.id_paciente == 0) {
                    let raw = &row.hora_inicio;
                    let time = NaiveTime::parse_from_str(raw, "%H:%M:%S")
                        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"));
                    if let Ok(time) = time {
                        slots.push(Slot {
                            date,
                            time,
                            location: loc,
                        });
                    }
                }
            }
        }

        Ok(slots)
    }

    async fn local_slots(
        &self,
        from: NaiveDate,
        location: Option<ClinicLocation>,
        days_ahead: u32,
    ) -> Vec<Slot> {
        let hours = self.business_hours().await;
        generate_local_slots(&hours, from, days_ahead, location)
    }

    /// Business-hours strings per location from the `business_hours` config
    /// section, defaulting when the store or the section is unavailable.
    async fn business_hours(&self) -> HashMap<ClinicLocation, String> {
        let mut hours: HashMap<ClinicLocation, String> = ClinicLocation::ALL
            .into_iter()
            .map(|location| (location, default_hours_string(location).to_string()))
            .collect();

        let path = "/rest/v1/ai_config?key=eq.business_hours&select=value&limit=1";
        let result: anyhow::Result<Vec<Value>> =
            self.supabase.request(Method::GET, path, None).await;

        match result {
            Ok(rows) => {
                if let Some(value) = rows.first().and_then(|row| row.get("value")) {
                    for location in ClinicLocation::ALL {
                        if let Some(configured) =
                            value.get(location.to_string()).and_then(Value::as_str)
                        {
                            hours.insert(location, configured.to_string());
                        }
                    }
                }
            }
            Err(e) => warn!("Could not load business hours config: {}", e),
        }

        hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOURS: &str = "L-V 08:00–18:00; Sáb 08:00–13:00; Festivos: cerrado";

    fn hours_map() -> HashMap<ClinicLocation, String> {
        ClinicLocation::ALL
            .into_iter()
            .map(|location| (location, HOURS.to_string()))
            .collect()
    }

    #[test]
    fn weekday_window_is_parsed() {
        let (start, end) = parse_day_window(HOURS, Weekday::Tue).unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(18, 0, 0).unwrap());
    }

    #[test]
    fn saturday_window_is_shorter() {
        let (start, end) = parse_day_window(HOURS, Weekday::Sat).unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(13, 0, 0).unwrap());
    }

    #[test]
    fn sunday_is_always_closed() {
        assert!(parse_day_window(HOURS, Weekday::Sun).is_none());

        // 2026-02-08 is a Sunday.
        let sunday = NaiveDate::from_ymd_opt(2026, 2, 8).unwrap();
        let slots = generate_local_slots(&hours_map(), sunday, 1, None);
        assert!(slots.is_empty());
    }

    #[test]
    fn ascii_hyphen_separator_is_accepted() {
        let (start, end) = parse_day_window("L-V 09:00-17:00", Weekday::Mon).unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
    }

    #[test]
    fn slots_are_generated_on_a_thirty_minute_grid() {
        // 2026-02-09 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        let slots = generate_local_slots(&hours_map(), monday, 1, Some(ClinicLocation::Rodadero));

        // 08:00 through 17:30 inclusive.
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0].time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(slots[1].time, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(
            slots.last().unwrap().time,
            NaiveTime::from_hms_opt(17, 30, 0).unwrap()
        );
        assert!(slots.iter().all(|slot| slot.location == ClinicLocation::Rodadero));
    }

    #[test]
    fn unparsable_weekday_hours_fall_back_to_defaults() {
        let mut hours = HashMap::new();
        hours.insert(ClinicLocation::Manzanares, "horario raro".to_string());

        // Monday: default window applies (08:00–17:00 for Manzanares).
        let monday = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        let slots = generate_local_slots(&hours, monday, 1, Some(ClinicLocation::Manzanares));
        assert_eq!(slots.len(), 18);

        // Saturday: no default, the day stays closed.
        let saturday = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let slots = generate_local_slots(&hours, saturday, 1, Some(ClinicLocation::Manzanares));
        assert!(slots.is_empty());
    }
}
