use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use shared_models::Provider;

/// Intake fields collected before booking, in fixed order: required fields
/// first, then optional ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatientField {
    Name,
    Phone,
    DateOfBirth,
    Gender,
    Reason,
}

impl PatientField {
    pub const ORDER: [PatientField; 5] = [
        PatientField::Name,
        PatientField::Phone,
        PatientField::DateOfBirth,
        PatientField::Gender,
        PatientField::Reason,
    ];

    pub fn first() -> Self {
        Self::ORDER[0]
    }

    pub fn next(&self) -> Option<Self> {
        let index = Self::ORDER.iter().position(|f| f == self)?;
        Self::ORDER.get(index + 1).copied()
    }

    pub fn is_required(&self) -> bool {
        matches!(
            self,
            PatientField::Name | PatientField::Phone | PatientField::DateOfBirth
        )
    }

    /// Short name stored in `collected_field_names` (names only, never values).
    pub fn name(&self) -> &'static str {
        match self {
            PatientField::Name => "name",
            PatientField::Phone => "phone",
            PatientField::DateOfBirth => "date_of_birth",
            PatientField::Gender => "gender",
            PatientField::Reason => "reason",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|f| f.name() == name)
    }

    /// Patient-table column the value lands in once consent is granted.
    pub fn column(&self) -> &'static str {
        match self {
            PatientField::Name => "full_name",
            PatientField::Phone => "phone",
            PatientField::DateOfBirth => "date_of_birth",
            PatientField::Gender => "gender",
            PatientField::Reason => "visit_reason",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            PatientField::Name => "May I have your full name?",
            PatientField::Phone => "What phone number can we reach you on?",
            PatientField::DateOfBirth => "What is your date of birth? (YYYY-MM-DD)",
            PatientField::Gender => "How do you describe your gender? (you may answer 'skip')",
            PatientField::Reason => "Briefly, what is the reason for your visit?",
        }
    }
}

/// Persisted step of a conversation, stored as a string such as
/// `collecting_phone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStep {
    Idle,
    Collecting(PatientField),
    Consent,
    SelectingSlot,
    Responded,
    Revoked,
}

impl ConversationStep {
    pub fn as_str(&self) -> String {
        match self {
            ConversationStep::Idle => "idle".to_string(),
            ConversationStep::Collecting(field) => format!("collecting_{}", field.name()),
            ConversationStep::Consent => "consent".to_string(),
            ConversationStep::SelectingSlot => "selecting_slot".to_string(),
            ConversationStep::Responded => "responded".to_string(),
            ConversationStep::Revoked => "revoked".to_string(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "idle" => ConversationStep::Idle,
            "consent" => ConversationStep::Consent,
            "selecting_slot" => ConversationStep::SelectingSlot,
            "responded" => ConversationStep::Responded,
            "revoked" => ConversationStep::Revoked,
            other => match other
                .strip_prefix("collecting_")
                .and_then(PatientField::from_name)
            {
                Some(field) => ConversationStep::Collecting(field),
                // An unrecognized step in the store resets the flow rather
                // than wedging the conversation.
                None => ConversationStep::Idle,
            },
        }
    }
}

impl Serialize for ConversationStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConversationStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ConversationStep::parse(&raw))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub contact_id: String,
}

/// Read-modify-write state of one conversation. Field *values* never appear
/// here; only the names of what has been collected so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: Uuid,
    pub step: ConversationStep,
    pub last_intent: Option<String>,
    #[serde(default)]
    pub collected_field_names: Vec<String>,
    pub consent_requested_at: Option<DateTime<Utc>>,
    pub slot_selection_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            step: ConversationStep::Idle,
            last_intent: None,
            collected_field_names: Vec::new(),
            consent_requested_at: None,
            slot_selection_date: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub direction: MessageDirection,
    pub content: String,
    pub platform_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-doctor channel link: maps the receiving phone-number id to a doctor
/// and carries the credentials for sending replies on that channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorChannel {
    pub doctor_id: Uuid,
    pub phone_number_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    BookAppointment,
    RevokeConsent,
    General,
}

#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent: Intent,
    pub label: String,
    pub confidence: f64,
}

impl Intent {
    pub fn from_label(label: &str) -> Self {
        match label {
            "book_appointment" | "book" | "schedule_appointment" => Intent::BookAppointment,
            "revoke_consent" | "delete_my_data" | "opt_out" => Intent::RevokeConsent,
            _ => Intent::General,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentReply {
    Granted,
    Denied,
    Unclear,
}

/// One inbound chat message, normalized out of the provider payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub provider: Provider,
    /// Sender's stable contact id (wa_id).
    pub contact_id: String,
    /// Receiving business number, resolved to a doctor via `doctor_channels`.
    pub phone_number_id: String,
    pub message_id: String,
    pub text: String,
}

impl InboundMessage {
    /// Extracts text messages from a WhatsApp Cloud API webhook payload.
    /// Non-text entries (statuses, media) are skipped.
    pub fn parse_whatsapp(payload: &Value) -> Vec<InboundMessage> {
        let mut messages = Vec::new();

        let entries = payload.get("entry").and_then(Value::as_array);
        for entry in entries.into_iter().flatten() {
            let changes = entry.get("changes").and_then(Value::as_array);
            for change in changes.into_iter().flatten() {
                let value = match change.get("value") {
                    Some(v) => v,
                    None => continue,
                };
                let phone_number_id = value
                    .pointer("/metadata/phone_number_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();

                let inbound = value.get("messages").and_then(Value::as_array);
                for message in inbound.into_iter().flatten() {
                    let (Some(id), Some(from)) = (
                        message.get("id").and_then(Value::as_str),
                        message.get("from").and_then(Value::as_str),
                    ) else {
                        continue;
                    };
                    let Some(text) = message.pointer("/text/body").and_then(Value::as_str) else {
                        continue;
                    };

                    messages.push(InboundMessage {
                        provider: Provider::Whatsapp,
                        contact_id: from.to_string(),
                        phone_number_id: phone_number_id.to_string(),
                        message_id: id.to_string(),
                        text: text.to_string(),
                    });
                }
            }
        }

        messages
    }
}
