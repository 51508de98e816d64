//! Visa-consultation skills: slot lookup, booking, visa facts, callbacks.
//!
//! Scheduling is simulated against a fixed weekly timetable with random
//! slot occupancy. Dates arrive as natural language ("tomorrow",
//! "friday", "March 12") and are resolved relative to the current day.

use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const WEEKDAY_SLOTS: &[&str] = &[
    "9:00 AM", "10:00 AM", "11:00 AM", "2:00 PM", "3:00 PM", "4:00 PM", "5:00 PM",
];
const SATURDAY_SLOTS: &[&str] = &["10:00 AM", "11:00 AM", "12:00 PM", "1:00 PM"];

/// Facts about one visa category, read out during consultations.
struct VisaInfo {
    key: &'static str,
    name: &'static str,
    consultation_fee: &'static str,
    processing_time: &'static str,
    common_requirements: &'static [&'static str],
    description: &'static str,
}

const VISA_CATALOG: &[VisaInfo] = &[
    VisaInfo {
        key: "tourist",
        name: "Tourist Visa",
        consultation_fee: "$50",
        processing_time: "5-15 business days",
        common_requirements: &[
            "Valid passport (6+ months validity)",
            "Passport-size photographs",
            "Proof of accommodation",
            "Travel itinerary",
            "Bank statements (3 months)",
            "Travel insurance",
        ],
        description: "Perfect for leisure travel, visiting family, or short vacations abroad.",
    },
    VisaInfo {
        key: "student",
        name: "Student Visa",
        consultation_fee: "$75",
        processing_time: "2-8 weeks",
        common_requirements: &[
            "Acceptance letter from institution",
            "Proof of financial support",
            "Academic transcripts",
            "Language proficiency test scores",
            "Valid passport",
            "Medical examination",
        ],
        description: "For pursuing education abroad at universities, colleges, or language schools.",
    },
    VisaInfo {
        key: "work",
        name: "Work Visa",
        consultation_fee: "$100",
        processing_time: "4-12 weeks",
        common_requirements: &[
            "Job offer letter",
            "Employment contract",
            "Employer sponsorship documents",
            "Professional qualifications",
            "Work experience certificates",
            "Background check",
        ],
        description: "For employment opportunities in foreign countries.",
    },
    VisaInfo {
        key: "business",
        name: "Business Visa",
        consultation_fee: "$75",
        processing_time: "1-4 weeks",
        common_requirements: &[
            "Business invitation letter",
            "Company registration documents",
            "Purpose of visit letter",
            "Bank statements",
            "Previous travel history",
        ],
        description: "For business meetings, conferences, and professional engagements abroad.",
    },
    VisaInfo {
        key: "immigration",
        name: "Immigration Consulting",
        consultation_fee: "$150",
        processing_time: "Varies by program",
        common_requirements: &[
            "Varies by destination country",
            "Points-based assessment",
            "Language proficiency",
            "Work experience evaluation",
            "Educational credential assessment",
        ],
        description: "Comprehensive guidance for permanent residency and citizenship applications.",
    },
];

/// A booked consultation, keyed by its confirmation code.
#[derive(Debug, Clone)]
pub struct Appointment {
    pub customer_name: String,
    pub phone_number: String,
    pub date: String,
    pub time: String,
    pub visa_type: &'static str,
    pub fee: &'static str,
    pub status: &'static str,
    pub cancellation_reason: Option<String>,
}

/// A pending request for a consultant to phone the caller back.
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    pub id: String,
    pub customer_name: String,
    pub phone_number: String,
    pub inquiry_type: String,
    pub status: &'static str,
}

/// In-memory appointment state for the consultancy.
#[derive(Debug, Default)]
pub struct AppointmentBook {
    appointments: HashMap<String, Appointment>,
    callbacks: Vec<CallbackRequest>,
    fixed_today: Option<NaiveDate>,
}

/// Parameters for the `get_available_slots` skill.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotsParams {
    pub date: String,
    pub visa_type: Option<String>,
}

/// Parameters for the `book_appointment` skill.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookAppointmentParams {
    pub customer_name: String,
    pub phone_number: String,
    pub date: String,
    pub time: String,
    pub visa_type: String,
}

/// Parameters for the `get_visa_info` skill.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisaInfoParams {
    pub visa_type: String,
    pub destination_country: Option<String>,
}

/// Parameters for the `check_appointment` skill.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckAppointmentParams {
    pub confirmation_code: Option<String>,
    pub phone_number: Option<String>,
}

/// Parameters for the `cancel_appointment` skill.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelAppointmentParams {
    pub confirmation_code: String,
    pub reason: Option<String>,
}

/// Parameters for the `request_callback` skill.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestCallbackParams {
    pub customer_name: String,
    pub phone_number: String,
    pub inquiry_type: Option<String>,
}

impl AppointmentBook {
    fn today(&self) -> NaiveDate {
        self.fixed_today
            .unwrap_or_else(|| Local::now().date_naive())
    }

    #[cfg(test)]
    fn pin_today(&mut self, date: NaiveDate) {
        self.fixed_today = Some(date);
    }

    /// Open slots on a given day, with a random share already taken.
    pub fn available_slots(&self, date: &str, visa_type: Option<&str>) -> String {
        let target = parse_spoken_date(date, self.today());
        let day_name = target.format("%A").to_string();
        let formatted_date = target.format("%B %d, %Y").to_string();

        let slots = business_hours(target.weekday());
        if slots.is_empty() {
            return format!(
                "I'm sorry, we're closed on {day_name}s. Our office hours are Monday through \
                 Friday 9 AM to 6 PM, and Saturday 10 AM to 2 PM. Would you like to check \
                 another day?"
            );
        }

        let mut rng = rand::rng();
        let available: Vec<&str> = slots
            .iter()
            .filter(|_| rng.random_bool(0.7))
            .copied()
            .collect();
        if available.is_empty() {
            return format!(
                "I'm sorry, we're fully booked on {formatted_date}. \
                 Would you like to check the next available day?"
            );
        }

        let slots_text = match available.as_slice() {
            [only] => (*only).to_string(),
            [init @ .., last] => format!("{} and {last}", init.join(", ")),
            [] => String::new(),
        };

        let mut response =
            format!("For {formatted_date}, we have appointments available at {slots_text}.");
        if let Some(info) = visa_type.and_then(find_visa) {
            response.push_str(&format!(
                " A {} consultation is {}.",
                info.name, info.consultation_fee
            ));
        }
        response.push_str(" Which time works best for you?");
        response
    }

    /// Books a consultation and hands back a confirmation code.
    pub fn book(
        &mut self,
        customer_name: &str,
        phone_number: &str,
        date: &str,
        time: &str,
        visa_type: &str,
    ) -> String {
        let target = parse_spoken_date(date, self.today());
        if target.weekday() == Weekday::Sun {
            return "I'm sorry, we're closed on Sundays. Would you like to book for another day?"
                .to_string();
        }
        let formatted_date = target.format("%B %d, %Y").to_string();

        let confirmation_code = confirmation_code();
        // Unknown visa types fall back to the tourist consultation.
        let info = find_visa(visa_type).unwrap_or(&VISA_CATALOG[0]);

        self.appointments.insert(
            confirmation_code.clone(),
            Appointment {
                customer_name: customer_name.to_string(),
                phone_number: phone_number.to_string(),
                date: formatted_date.clone(),
                time: time.to_string(),
                visa_type: info.name,
                fee: info.consultation_fee,
                status: "confirmed",
                cancellation_reason: None,
            },
        );
        info!(code = %confirmation_code, customer = %customer_name, "appointment booked");

        format!(
            "Perfect! I've booked your {} consultation. \
             Your appointment is confirmed for {formatted_date} at {time}. \
             Your confirmation code is {confirmation_code}. \
             The consultation fee is {}, payable at the office. \
             We'll send a confirmation to {phone_number}. \
             Is there anything else I can help you with?",
            info.name, info.consultation_fee
        )
    }

    /// Looks up an appointment by confirmation code or by phone number.
    pub fn check(&self, confirmation_code: Option<&str>, phone_number: Option<&str>) -> String {
        if let Some(code) = confirmation_code {
            if let Some(apt) = self.appointments.get(&code.to_uppercase()) {
                return format!(
                    "I found your appointment. {}, you have a {} consultation on {} at {}. \
                     Status: {}. Is there anything you'd like to change?",
                    apt.customer_name, apt.visa_type, apt.date, apt.time, apt.status
                );
            }
        }
        if let Some(phone) = phone_number {
            for (code, apt) in &self.appointments {
                if apt.phone_number == phone {
                    return format!(
                        "I found an appointment for {}. Your {} consultation is on {} at {}. \
                         Confirmation code: {code}. Would you like to make any changes?",
                        apt.customer_name, apt.visa_type, apt.date, apt.time
                    );
                }
            }
        }
        "I couldn't find an appointment with those details. Could you please provide your \
         confirmation code or the phone number used for booking?"
            .to_string()
    }

    /// Marks an appointment cancelled, keeping the record for later lookups.
    pub fn cancel(&mut self, confirmation_code: &str, reason: Option<&str>) -> String {
        let code = confirmation_code.trim().to_uppercase();
        let Some(apt) = self.appointments.get_mut(&code) else {
            return "I couldn't find an appointment with that confirmation code. \
                    Could you please verify the code?"
                .to_string();
        };

        apt.status = "cancelled";
        apt.cancellation_reason = Some(reason.unwrap_or("Not provided").to_string());
        info!(code = %code, "appointment cancelled");

        format!(
            "I've cancelled your {} consultation that was scheduled for {} at {}. \
             If you'd like to reschedule, I'm happy to help you find a new time. \
             Is there anything else I can assist with?",
            apt.visa_type, apt.date, apt.time
        )
    }

    /// Queues a callback request for a human consultant.
    pub fn request_callback(
        &mut self,
        customer_name: &str,
        phone_number: &str,
        inquiry_type: Option<&str>,
    ) -> String {
        let callback_id = confirmation_code();
        self.callbacks.push(CallbackRequest {
            id: callback_id.clone(),
            customer_name: customer_name.to_string(),
            phone_number: phone_number.to_string(),
            inquiry_type: inquiry_type.unwrap_or("General inquiry").to_string(),
            status: "pending",
        });
        info!(id = %callback_id, customer = %customer_name, "callback requested");

        format!(
            "Thank you, {customer_name}. I've submitted a callback request for you. \
             One of our visa consultants will call you at {phone_number} within the next \
             2 business hours. Your reference number is {callback_id}. \
             Is there anything else I can help you with in the meantime?"
        )
    }
}

/// Describes a visa category without touching any stored state.
pub fn visa_info(visa_type: &str, destination_country: Option<&str>) -> String {
    let Some(info) = find_visa(visa_type) else {
        let available = VISA_CATALOG
            .iter()
            .map(|v| v.name)
            .collect::<Vec<_>>()
            .join(", ");
        return format!("I can help with: {available}. Which type of visa are you interested in?");
    };

    let requirements = info
        .common_requirements
        .iter()
        .take(3)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    let mut response = format!(
        "{}: {} Our consultation fee is {} and typical processing time is {}. \
         Common requirements include: {requirements} and more. ",
        info.name, info.description, info.consultation_fee, info.processing_time
    );
    if let Some(country) = destination_country {
        response.push_str(&format!(
            "Requirements can vary for {country}, so I'd recommend booking a consultation \
             for personalized guidance. "
        ));
    }
    response.push_str("Would you like to schedule a consultation with one of our experts?");
    response
}

/// Resolves a spoken date ("today", "friday", "March 12", "3/12") to a
/// calendar date on or after `today`. Unparseable input means tomorrow.
pub fn parse_spoken_date(spoken: &str, today: NaiveDate) -> NaiveDate {
    const DAY_NAMES: [&str; 7] = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];

    let wanted = spoken.trim().to_lowercase();
    if wanted == "today" {
        return today;
    }
    if wanted == "tomorrow" {
        return today + Duration::days(1);
    }
    if let Some(target_day) = DAY_NAMES.iter().position(|d| *d == wanted) {
        let current = i64::from(today.weekday().num_days_from_monday());
        let mut days_ahead = (target_day as i64 - current).rem_euclid(7);
        if days_ahead == 0 {
            // Same day name means next week, not right now.
            days_ahead = 7;
        }
        return today + Duration::days(days_ahead);
    }

    // Month-and-day forms carry no year, so append one before parsing.
    for fmt in ["%B %d %Y", "%b %d %Y", "%m/%d %Y", "%d/%m %Y"] {
        let with_year = format!("{} {}", spoken.trim(), today.year());
        if let Ok(parsed) = NaiveDate::parse_from_str(&with_year, fmt) {
            if parsed < today {
                let bumped = format!("{} {}", spoken.trim(), today.year() + 1);
                if let Ok(next_year) = NaiveDate::parse_from_str(&bumped, fmt) {
                    return next_year;
                }
            }
            return parsed;
        }
    }

    today + Duration::days(1)
}

fn business_hours(day: Weekday) -> &'static [&'static str] {
    match day {
        Weekday::Sat => SATURDAY_SLOTS,
        Weekday::Sun => &[],
        _ => WEEKDAY_SLOTS,
    }
}

/// Finds a catalog entry by key, accepting partial matches in either
/// direction ("work permit" resolves to "work").
fn find_visa(visa_type: &str) -> Option<&'static VisaInfo> {
    let wanted = visa_type.trim().to_lowercase();
    VISA_CATALOG
        .iter()
        .find(|v| wanted.contains(v.key) || v.key.contains(wanted.as_str()))
}

/// A six-character uppercase alphanumeric confirmation code.
fn confirmation_code() -> String {
    let mut rng = rand::rng();
    (0..6)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
