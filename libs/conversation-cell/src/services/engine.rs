use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use appointment_cell::{AppointmentError, AvailabilityService, AvailableSlot, BookingService};
use patient_cell::PatientService;
use payment_cell::PaymentLinkService;
use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::error::ConversationError;
use crate::models::{
    ConsentReply, Conversation, ConversationState, ConversationStep, DoctorChannel,
    InboundMessage, Intent, IntentResult, PatientField, StoredMessage,
};
use crate::services::cache::FieldCache;
use crate::services::consent::{parse_consent, CONSENT_PROMPT, CONSENT_REPROMPT};
use crate::services::delivery::ChannelDeliveryClient;
use crate::services::fields;
use crate::services::intent::IntentClassifierClient;
use crate::services::reply::ReplyGeneratorClient;
use crate::services::store::ConversationStore;

/// How many days ahead to look for a bookable day when the patient asks to
/// book again.
const SLOT_SEARCH_DAYS: i64 = 7;

/// Interprets one inbound message against the persisted conversation state
/// and emits a reply plus the successor state. All user-input problems are
/// handled locally as re-prompts; external-service outages propagate so the
/// queue can retry the job.
pub struct ConversationEngine {
    store: ConversationStore,
    patients: PatientService,
    availability: AvailabilityService,
    bookings: BookingService,
    payment_links: PaymentLinkService,
    intents: IntentClassifierClient,
    replies: ReplyGeneratorClient,
    delivery: Arc<ChannelDeliveryClient>,
    cache: Arc<FieldCache>,
    fee_minor: i64,
    currency: String,
}

impl ConversationEngine {
    pub fn new(
        config: &AppConfig,
        supabase: Arc<SupabaseClient>,
        delivery: Arc<ChannelDeliveryClient>,
        cache: Arc<FieldCache>,
    ) -> Self {
        Self {
            store: ConversationStore::new(Arc::clone(&supabase)),
            patients: PatientService::new(Arc::clone(&supabase)),
            availability: AvailabilityService::new(Arc::clone(&supabase)),
            bookings: BookingService::new(Arc::clone(&supabase)),
            payment_links: PaymentLinkService::new(config, Arc::clone(&supabase)),
            intents: IntentClassifierClient::new(config),
            replies: ReplyGeneratorClient::new(config),
            delivery,
            cache,
            fee_minor: config.consultation_fee_minor,
            currency: config.consultation_currency.clone(),
        }
    }

    pub async fn handle_message(&self, inbound: &InboundMessage) -> Result<(), ConversationError> {
        let result = self.process(inbound).await;

        if let Err(e) = &result {
            // Audit entry carries ids only, never message content.
            error!(
                message_id = %inbound.message_id,
                provider = %inbound.provider,
                "Conversation processing failed: {}",
                e
            );
        }

        result
    }

    /// Sends a free-standing notification to a contact on the doctor's
    /// channel, outside any inbound-message flow.
    pub async fn notify_contact(
        &self,
        doctor_id: Uuid,
        contact_id: &str,
        text: &str,
    ) -> Result<(), ConversationError> {
        let channel = self
            .store
            .resolve_channel_for_doctor(doctor_id)
            .await?
            .ok_or_else(|| ConversationError::ChannelNotLinked(doctor_id.to_string()))?;

        let conversation = self.store.find_conversation(doctor_id, contact_id).await?;
        if let Some(conversation) = conversation {
            self.store.insert_outbound(conversation.id, text).await?;
        }

        self.delivery.send(&channel, contact_id, text).await
    }

    async fn process(&self, inbound: &InboundMessage) -> Result<(), ConversationError> {
        let channel = self
            .store
            .resolve_doctor_channel(&inbound.phone_number_id)
            .await?
            .ok_or_else(|| ConversationError::ChannelNotLinked(inbound.phone_number_id.clone()))?;

        let patient = self
            .patients
            .find_or_create_by_contact(&inbound.contact_id)
            .await?;

        let conversation = self
            .store
            .find_or_create_conversation(channel.doctor_id, patient.id, &inbound.contact_id)
            .await?;

        let mut state = self.store.load_or_create_state(conversation.id).await?;
        let history = self.store.recent_messages(conversation.id, 10).await?;

        let intent = self.intents.classify(&inbound.text).await?;

        // Persisting under the platform message id makes redelivery after a
        // mid-flight retry a duplicate insert, not a second message.
        self.store.insert_inbound(conversation.id, inbound).await?;

        let reply = self
            .dispatch(&channel, &conversation, patient.id, &mut state, &intent, &inbound.text, &history)
            .await?;

        state.last_intent = Some(intent.label.clone());
        state.updated_at = Utc::now();

        self.store.insert_outbound(conversation.id, &reply).await?;
        self.store.save_state(&state).await?;

        self.delivery.send(&channel, &inbound.contact_id, &reply).await?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        channel: &DoctorChannel,
        conversation: &Conversation,
        patient_id: Uuid,
        state: &mut ConversationState,
        intent: &IntentResult,
        text: &str,
        history: &[StoredMessage],
    ) -> Result<String, ConversationError> {
        match (intent.intent, state.step) {
            // Revocation wins over everything else, from any step.
            (Intent::RevokeConsent, _) => self.handle_revoke(conversation, patient_id, state).await,

            (Intent::BookAppointment, ConversationStep::Idle)
            | (Intent::BookAppointment, ConversationStep::Revoked) => {
                self.start_collection(conversation, state).await
            }

            (_, ConversationStep::Collecting(field)) => {
                self.handle_field_reply(conversation, state, field, text).await
            }

            (_, ConversationStep::Consent) => {
                self.handle_consent_reply(conversation, patient_id, state, text).await
            }

            (_, ConversationStep::SelectingSlot) => {
                self.handle_slot_reply(channel, conversation, patient_id, state, text).await
            }

            (Intent::BookAppointment, ConversationStep::Responded) => {
                self.offer_next_available_day(channel, state).await
            }

            // Everything else: context-aware generic reply, step unchanged.
            _ => Ok(self.replies.generate(text, &intent.label, history).await),
        }
    }

    async fn handle_revoke(
        &self,
        conversation: &Conversation,
        patient_id: Uuid,
        state: &mut ConversationState,
    ) -> Result<String, ConversationError> {
        info!("Consent revoked on conversation {}", conversation.id);

        self.patients.anonymize(patient_id).await?;
        self.cache.purge(conversation.id).await;

        state.step = ConversationStep::Responded;
        state.collected_field_names.clear();

        Ok("Understood. We've removed your personal details from our records. \
            You're welcome back any time."
            .to_string())
    }

    async fn start_collection(
        &self,
        conversation: &Conversation,
        state: &mut ConversationState,
    ) -> Result<String, ConversationError> {
        let first = PatientField::first();

        // A fresh run starts clean even if an earlier one was abandoned.
        self.cache.purge(conversation.id).await;
        state.collected_field_names.clear();
        state.step = ConversationStep::Collecting(first);

        Ok(format!(
            "Happy to help you book an appointment. {}",
            first.prompt()
        ))
    }

    async fn handle_field_reply(
        &self,
        conversation: &Conversation,
        state: &mut ConversationState,
        field: PatientField,
        text: &str,
    ) -> Result<String, ConversationError> {
        match fields::validate(field, text) {
            // Validation failure: re-prompt, step unchanged.
            Err(user_error) => Ok(user_error),
            Ok(value) => {
                self.cache.insert(conversation.id, field.column(), value).await;
                state.collected_field_names.push(field.name().to_string());

                match field.next() {
                    Some(next) => {
                        state.step = ConversationStep::Collecting(next);
                        Ok(next.prompt().to_string())
                    }
                    None => {
                        state.step = ConversationStep::Consent;
                        state.consent_requested_at = Some(Utc::now());
                        Ok(CONSENT_PROMPT.to_string())
                    }
                }
            }
        }
    }

    async fn handle_consent_reply(
        &self,
        conversation: &Conversation,
        patient_id: Uuid,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<String, ConversationError> {
        match parse_consent(text) {
            ConsentReply::Granted => {
                let values = self.cache.take(conversation.id).await;
                self.patients.apply_consented_fields(patient_id, &values).await?;
                state.step = ConversationStep::Responded;

                Ok("Thank you! Your details are saved. Reply 'book' to pick an appointment time."
                    .to_string())
            }
            ConsentReply::Denied => {
                // Nothing collected ever becomes durable.
                self.cache.purge(conversation.id).await;
                self.patients
                    .set_consent_status(patient_id, patient_cell::ConsentStatus::Denied)
                    .await?;
                state.step = ConversationStep::Responded;

                Ok("No problem - we haven't stored any of the details you shared. \
                    Feel free to reach out again any time."
                    .to_string())
            }
            ConsentReply::Unclear => Ok(CONSENT_REPROMPT.to_string()),
        }
    }

    async fn handle_slot_reply(
        &self,
        channel: &DoctorChannel,
        conversation: &Conversation,
        patient_id: Uuid,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<String, ConversationError> {
        let date = effective_slot_date(state.slot_selection_date, Utc::now().date_naive());
        state.slot_selection_date = Some(date);

        // Re-derived live, never cached: the offered list may have gone
        // stale the moment another booking landed.
        let slots = self
            .availability
            .get_available_slots(channel.doctor_id, date)
            .await
            .map_err(|e| ConversationError::Booking(e.to_string()))?;

        if slots.is_empty() {
            return self.offer_next_available_day(channel, state).await;
        }

        let choice = match parse_slot_choice(text, slots.len()) {
            Some(index) => index,
            None => {
                return Ok(format!(
                    "Please pick a slot by number:\n{}",
                    format_slot_list(date, &slots)
                ));
            }
        };

        let slot = &slots[choice];
        match self.bookings.book(channel.doctor_id, patient_id, slot.start_time).await {
            Ok(appointment) => {
                state.step = ConversationStep::Responded;
                info!(
                    "Conversation {} booked appointment {}",
                    conversation.id, appointment.id
                );

                // Payment link is best-effort: the booking stands even if
                // link creation fails.
                match self
                    .payment_links
                    .create_link(
                        self.fee_minor,
                        &self.currency,
                        appointment.id,
                        &conversation.contact_id,
                    )
                    .await
                {
                    Ok(link) => Ok(format!(
                        "You're booked for {} at {}. To confirm, please pay the consultation fee: {}",
                        slot.start_time.format("%A %d %B"),
                        slot.start_time.format("%H:%M"),
                        link.url
                    )),
                    Err(e) => {
                        warn!("Payment link creation failed, confirming without it: {}", e);
                        Ok(format!(
                            "You're booked for {} at {}. See you then!",
                            slot.start_time.format("%A %d %B"),
                            slot.start_time.format("%H:%M")
                        ))
                    }
                }
            }
            // Lost the race: re-offer what's actually left, state unchanged.
            Err(AppointmentError::SlotConflict) | Err(AppointmentError::PastStartTime) => {
                let fresh = self
                    .availability
                    .get_available_slots(channel.doctor_id, date)
                    .await
                    .map_err(|e| ConversationError::Booking(e.to_string()))?;

                if fresh.is_empty() {
                    return self.offer_next_available_day(channel, state).await;
                }

                Ok(format!(
                    "Sorry, that slot was just taken. Here's what's still open:\n{}",
                    format_slot_list(date, &fresh)
                ))
            }
            Err(other) => Err(ConversationError::Booking(other.to_string())),
        }
    }

    async fn offer_next_available_day(
        &self,
        channel: &DoctorChannel,
        state: &mut ConversationState,
    ) -> Result<String, ConversationError> {
        let today = Utc::now().date_naive();

        for offset in 1..=SLOT_SEARCH_DAYS {
            let date = today + Duration::days(offset);
            let slots = self
                .availability
                .get_available_slots(channel.doctor_id, date)
                .await
                .map_err(|e| ConversationError::Booking(e.to_string()))?;

            if !slots.is_empty() {
                state.step = ConversationStep::SelectingSlot;
                state.slot_selection_date = Some(date);

                return Ok(format!(
                    "Here are the available times:\n{}\nReply with the number of the slot you'd like.",
                    format_slot_list(date, &slots)
                ));
            }
        }

        state.step = ConversationStep::Responded;
        Ok("There are no open slots in the coming week. Please check back with us soon."
            .to_string())
    }
}

/// The date slots are offered for. A persisted date that has slipped into
/// the past would only offer unbookable slots, so it falls back to tomorrow.
pub fn effective_slot_date(stored: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    stored
        .filter(|date| *date > today)
        .unwrap_or_else(|| today + Duration::days(1))
}

/// Parses a 1-based slot choice. Anything out of range or non-numeric is a
/// re-offer, not an error.
pub fn parse_slot_choice(text: &str, slot_count: usize) -> Option<usize> {
    let choice: usize = text.trim().trim_end_matches('.').parse().ok()?;
    if choice >= 1 && choice <= slot_count {
        Some(choice - 1)
    } else {
        None
    }
}

pub fn format_slot_list(date: NaiveDate, slots: &[AvailableSlot]) -> String {
    let mut lines = vec![format!("{}:", date.format("%A %d %B"))];
    for (i, slot) in slots.iter().enumerate() {
        lines.push(format!(
            "{}. {} - {}",
            i + 1,
            slot.start_time.format("%H:%M"),
            slot.end_time.format("%H:%M")
        ));
    }
    lines.join("\n")
}
