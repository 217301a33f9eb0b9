use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use conversation_cell::models::Patient;
use scheduling_cell::models::{ClinicLocation, Slot};

use crate::models::{AiConfigEntry, BOOKING_BASE_YEAR};

/// Configuration sections in prompt order. Later sections are the first to
/// be truncated by the model's context window, so the most load-bearing
/// rules come first.
const SECTION_ORDER: [(&str, &str); 7] = [
    ("business_info", "INFORMACIÓN DEL NEGOCIO"),
    ("business_hours", "HORARIOS DE ATENCIÓN"),
    ("services_and_pricing", "SERVICIOS Y PRECIOS"),
    ("rules", "REGLAS DEL BOT"),
    ("urgency_protocol", "PROTOCOLO DE URGENCIAS"),
    ("booking_requirements", "REQUISITOS DE AGENDAMIENTO"),
    ("logistics_and_payments", "LOGÍSTICA Y PAGOS"),
];

pub struct PromptContext<'a> {
    pub bot_prompt: &'a str,
    pub config: &'a BTreeMap<String, AiConfigEntry>,
    pub phone_number: &'a str,
    pub patient: Option<&'a Patient>,
    pub has_history: bool,
    pub today: NaiveDate,
}

/// Assembles the full system prompt: identity, configuration sections in
/// fixed order, the per-patient context, and the technical booking block.
pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    let mut prompt = ctx.bot_prompt.to_string();

    for (key, title) in SECTION_ORDER {
        if let Some(entry) = ctx.config.get(key) {
            let rendered = serde_json::to_string_pretty(&entry.value).unwrap_or_default();
            prompt.push_str(&format!("\n\n=== {} ===\n{}", title, rendered));
        }
    }

    prompt.push_str("\n\n---\nCONTEXTO DEL PACIENTE ACTUAL:");
    prompt.push_str(&format!("\n- Número: {}", ctx.phone_number));
    match ctx.patient.filter(|patient| patient.is_registered()) {
        Some(patient) => {
            prompt.push_str(&format!(
                "\n- Nombre registrado: {}\n- IMPORTANTE: Este paciente YA está registrado. \
                 Salúdalo por su nombre y no le pidas datos que ya tenemos.",
                patient.name.as_deref().unwrap_or("")
            ));
            if let Some(document) = &patient.document {
                prompt.push_str(&format!("\n- Documento: {}", document));
            }
            if let Some(email) = &patient.email {
                prompt.push_str(&format!("\n- Email: {}", email));
            }
        }
        None => {
            prompt.push_str(
                "\n- Estado: NUEVO (no registrado en la base de datos)\
                 \n- IMPORTANTE: Sigue el flujo conversacional para nuevos pacientes definido arriba.",
            );
        }
    }

    if ctx.has_history {
        prompt.push_str(
            "\n\nINSTRUCCIONES DE CONTEXTO:\
             \n- Revisa el historial de la conversación para recordar información previa.\
             \n- Si el usuario menciona algo que ya hablaron antes, haz referencia a ello de manera natural.\
             \n- Mantén la coherencia con mensajes anteriores.",
        );
    }

    prompt.push_str(&format!(
        "\n\n---\nINFORMACIÓN TÉCNICA PARA CITAS:\
         \n- Fecha actual (Colombia): {}\
         \n- Año base: {}\
         \n- Huso horario: Colombia (GMT-5)\
         \n- Formato de fechas: YYYY-MM-DD (ejemplo: {}-01-25)\
         \n- RECUERDA: Siempre muestra un resumen y pide confirmación explícita antes de agendar.",
        ctx.today.format("%Y-%m-%d"),
        BOOKING_BASE_YEAR,
        BOOKING_BASE_YEAR,
    ));

    prompt
}

const WEEKDAYS_ES: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

fn spanish_date(date: NaiveDate) -> String {
    format!(
        "{} {} de {} de {}",
        WEEKDAYS_ES[date.weekday().num_days_from_monday() as usize],
        date.day(),
        MONTHS_ES[date.month0() as usize],
        date.year(),
    )
}

/// Renders the availability block injected when the user asks about slots:
/// grouped by date, at most five times shown per location per day.
pub fn format_availability(slots: &[Slot]) -> String {
    if slots.is_empty() {
        return "\n\nDISPONIBILIDAD: No hay slots disponibles en los próximos 7 días.".to_string();
    }

    let mut dates: Vec<NaiveDate> = slots.iter().map(|slot| slot.date).collect();
    dates.sort();
    dates.dedup();

    let mut lines = vec!["\n\nDISPONIBILIDAD DE CITAS (próximos 7 días):".to_string()];
    for date in dates {
        lines.push(format!("\n{}:", spanish_date(date)));

        for location in ClinicLocation::ALL {
            let times: Vec<String> = slots
                .iter()
                .filter(|slot| slot.date == date && slot.location == location)
                .map(|slot| slot.time.format("%H:%M").to_string())
                .collect();
            if times.is_empty() {
                continue;
            }

            let shown = times.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
            let extra = if times.len() > 5 {
                format!(" (+{} más)", times.len() - 5)
            } else {
                String::new()
            };
            let label = match location {
                ClinicLocation::Rodadero => "Rodadero",
                ClinicLocation::Manzanares => "Manzanares",
            };
            lines.push(format!("  {}: {}{}", label, shown, extra));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use serde_json::json;

    fn entry(key: &str, value: serde_json::Value) -> AiConfigEntry {
        AiConfigEntry {
            key: key.to_string(),
            value,
            description: None,
            updated_at: None,
            updated_by: None,
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let mut config = BTreeMap::new();
        // Inserted out of order on purpose; BTreeMap order must not leak.
        config.insert(
            "rules".to_string(),
            entry("rules", json!({ "no_inventar_precios": true })),
        );
        config.insert(
            "business_hours".to_string(),
            entry("business_hours", json!({ "rodadero": "L-V 08:00–18:00" })),
        );

        let ctx = PromptContext {
            bot_prompt: "Eres el asistente de la clínica.",
            config: &config,
            phone_number: "573001112233",
            patient: None,
            has_history: false,
            today: NaiveDate::from_ymd_opt(2026, 1, 25).unwrap(),
        };

        let prompt = build_system_prompt(&ctx);

        let hours_at = prompt.find("HORARIOS DE ATENCIÓN").unwrap();
        let rules_at = prompt.find("REGLAS DEL BOT").unwrap();
        assert!(hours_at < rules_at);
        assert!(prompt.starts_with("Eres el asistente de la clínica."));
        assert!(prompt.contains("Estado: NUEVO"));
        assert!(prompt.contains("Fecha actual (Colombia): 2026-01-25"));
    }

    #[test]
    fn registered_patient_context_includes_known_fields() {
        let patient = Patient {
            phone_number: "573001112233".to_string(),
            name: Some("Ana Pérez".to_string()),
            document: Some("12345678".to_string()),
            email: None,
            dentalink_patient_id: None,
            updated_at: None,
        };

        let config = BTreeMap::new();
        let ctx = PromptContext {
            bot_prompt: "Prompt base",
            config: &config,
            phone_number: "573001112233",
            patient: Some(&patient),
            has_history: true,
            today: NaiveDate::from_ymd_opt(2026, 1, 25).unwrap(),
        };

        let prompt = build_system_prompt(&ctx);
        assert!(prompt.contains("Nombre registrado: Ana Pérez"));
        assert!(prompt.contains("Documento: 12345678"));
        assert!(!prompt.contains("Estado: NUEVO"));
        assert!(prompt.contains("INSTRUCCIONES DE CONTEXTO"));
    }

    #[test]
    fn availability_block_caps_times_per_location() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 9).unwrap();
        let slots: Vec<Slot> = (0..7)
            .map(|i| Slot {
                date,
                time: NaiveTime::from_hms_opt(8 + i, 0, 0).unwrap(),
                location: ClinicLocation::Rodadero,
            })
            .collect();

        let block = format_availability(&slots);
        assert!(block.contains("lunes 9 de febrero de 2026"));
        assert!(block.contains("(+2 más)"));
    }

    #[test]
    fn empty_slots_render_the_no_availability_line() {
        let block = format_availability(&[]);
        assert!(block.contains("No hay slots disponibles"));
    }
}
