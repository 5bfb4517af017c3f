use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::error::ConversationError;
use crate::models::{
    Conversation, ConversationState, DoctorChannel, InboundMessage, MessageDirection,
    StoredMessage,
};

/// Persistence for conversations, per-conversation state, and the message
/// log. Message content is stored, never logged.
pub struct ConversationStore {
    supabase: Arc<SupabaseClient>,
}

impl ConversationStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Maps the receiving business number to the doctor behind it.
    pub async fn resolve_doctor_channel(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<DoctorChannel>, ConversationError> {
        let path = format!(
            "/rest/v1/doctor_channels?phone_number_id=eq.{}&limit=1",
            phone_number_id
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Reverse lookup: the doctor's sending channel, for notifications that
    /// originate outside an inbound message.
    pub async fn resolve_channel_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Option<DoctorChannel>, ConversationError> {
        let path = format!("/rest/v1/doctor_channels?doctor_id=eq.{}&limit=1", doctor_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_conversation(
        &self,
        doctor_id: Uuid,
        contact_id: &str,
    ) -> Result<Option<Conversation>, ConversationError> {
        let path = format!(
            "/rest/v1/conversations?doctor_id=eq.{}&contact_id=eq.{}&limit=1",
            doctor_id, contact_id
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_or_create_conversation(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        contact_id: &str,
    ) -> Result<Conversation, ConversationError> {
        if let Some(conversation) = self.find_conversation(doctor_id, contact_id).await? {
            return Ok(conversation);
        }

        let path = format!(
            "/rest/v1/conversations?doctor_id=eq.{}&contact_id=eq.{}&limit=1",
            doctor_id, contact_id
        );

        debug!("Creating conversation for doctor {} and contact", doctor_id);

        let created = self
            .supabase
            .insert_returning(
                "/rest/v1/conversations",
                json!({
                    "id": Uuid::new_v4(),
                    "doctor_id": doctor_id,
                    "patient_id": patient_id,
                    "contact_id": contact_id,
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await;

        match created {
            Ok(rows) => rows
                .into_iter()
                .next()
                .map(serde_json::from_value)
                .transpose()?
                .ok_or_else(|| {
                    ConversationError::Database("conversation insert returned no row".to_string())
                }),
            // Unique (doctor_id, contact_id) decides the first-contact race.
            Err(shared_database::DbError::Conflict(_)) => {
                let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;
                rows.into_iter()
                    .next()
                    .map(serde_json::from_value)
                    .transpose()?
                    .ok_or_else(|| {
                        ConversationError::Database("conversation vanished after conflict".to_string())
                    })
            }
            Err(other) => Err(other.into()),
        }
    }

    pub async fn load_or_create_state(
        &self,
        conversation_id: Uuid,
    ) -> Result<ConversationState, ConversationError> {
        let path = format!(
            "/rest/v1/conversation_states?conversation_id=eq.{}&limit=1",
            conversation_id
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(serde_json::from_value(row)?),
            None => Ok(ConversationState::new(conversation_id)),
        }
    }

    pub async fn save_state(&self, state: &ConversationState) -> Result<(), ConversationError> {
        self.supabase
            .upsert(
                "/rest/v1/conversation_states?on_conflict=conversation_id",
                serde_json::to_value(state)?,
            )
            .await?;
        Ok(())
    }

    /// Persists the inbound message under its stable platform message id.
    /// Redelivery on retry inserts the same id again; the unique constraint
    /// treats it as a duplicate, not an error.
    pub async fn insert_inbound(
        &self,
        conversation_id: Uuid,
        message: &InboundMessage,
    ) -> Result<(), ConversationError> {
        self.supabase
            .insert_ignore_duplicates(
                "/rest/v1/messages?on_conflict=platform_message_id",
                json!({
                    "id": Uuid::new_v4(),
                    "conversation_id": conversation_id,
                    "direction": MessageDirection::Inbound,
                    "content": message.text,
                    "platform_message_id": message.message_id,
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn insert_outbound(
        &self,
        conversation_id: Uuid,
        text: &str,
    ) -> Result<(), ConversationError> {
        self.supabase
            .insert_ignore_duplicates(
                "/rest/v1/messages",
                json!({
                    "id": Uuid::new_v4(),
                    "conversation_id": conversation_id,
                    "direction": MessageDirection::Outbound,
                    "content": text,
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ConversationError> {
        let path = format!(
            "/rest/v1/messages?conversation_id=eq.{}&order=created_at.desc&limit={}",
            conversation_id, limit
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        let mut messages: Vec<StoredMessage> = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?;

        // Oldest first for generator context.
        messages.reverse();
        Ok(messages)
    }
}
