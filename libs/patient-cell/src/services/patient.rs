use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::error::PatientError;
use crate::models::{ConsentStatus, Patient, ANONYMIZED, CONSENTED_COLUMNS};

pub struct PatientService {
    supabase: Arc<SupabaseClient>,
}

impl PatientService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Resolves the sending channel identity to a patient, creating a
    /// placeholder record on first contact. The placeholder carries no
    /// identifying fields; those only land after consent.
    pub async fn find_or_create_by_contact(&self, contact_id: &str) -> Result<Patient, PatientError> {
        let path = format!("/rest/v1/patients?contact_id=eq.{}&limit=1", contact_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        if let Some(row) = rows.into_iter().next() {
            return Ok(serde_json::from_value(row)?);
        }

        debug!("First contact from {}, creating placeholder patient", contact_id);

        let created = self
            .supabase
            .insert_returning(
                "/rest/v1/patients",
                json!({
                    "id": Uuid::new_v4(),
                    "contact_id": contact_id,
                    "consent_status": "none",
                    "created_at": Utc::now().to_rfc3339(),
                    "updated_at": Utc::now().to_rfc3339(),
                }),
            )
            .await;

        match created {
            Ok(rows) => rows
                .into_iter()
                .next()
                .map(serde_json::from_value)
                .transpose()?
                .ok_or_else(|| PatientError::Database("insert returned no row".to_string())),
            // Two workers racing on first contact: the unique constraint on
            // contact_id decides, the loser re-reads.
            Err(shared_database::DbError::Conflict(_)) => {
                let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;
                rows.into_iter()
                    .next()
                    .map(serde_json::from_value)
                    .transpose()?
                    .ok_or_else(|| PatientError::NotFound(contact_id.to_string()))
            }
            Err(other) => Err(other.into()),
        }
    }

    pub async fn get(&self, patient_id: Uuid) -> Result<Option<Patient>, PatientError> {
        let path = format!("/rest/v1/patients?id=eq.{}&limit=1", patient_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Persists collected field values after the patient granted consent.
    /// Only known identifying columns are written; unknown keys are dropped.
    pub async fn apply_consented_fields(
        &self,
        patient_id: Uuid,
        fields: &HashMap<String, String>,
    ) -> Result<(), PatientError> {
        let mut body = serde_json::Map::new();

        for column in CONSENTED_COLUMNS {
            if let Some(value) = fields.get(*column) {
                body.insert((*column).to_string(), json!(value));
            }
        }

        body.insert("consent_status".to_string(), json!("granted"));
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        info!(
            "Persisting {} consented fields for patient {}",
            body.len() - 2,
            patient_id
        );

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        self.supabase.update(&path, Value::Object(body)).await?;
        Ok(())
    }

    /// Revocation path: overwrite identifying columns with placeholders and
    /// record the revoked consent status.
    pub async fn anonymize(&self, patient_id: Uuid) -> Result<(), PatientError> {
        info!("Anonymizing patient {} after consent revocation", patient_id);

        let mut body = serde_json::Map::new();
        for column in CONSENTED_COLUMNS {
            body.insert((*column).to_string(), json!(ANONYMIZED));
        }
        body.insert("consent_status".to_string(), json!("revoked"));
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        self.supabase.update(&path, Value::Object(body)).await?;
        Ok(())
    }

    pub async fn set_consent_status(
        &self,
        patient_id: Uuid,
        status: ConsentStatus,
    ) -> Result<(), PatientError> {
        let status_value = serde_json::to_value(status)?;
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        self.supabase
            .update(
                &path,
                json!({
                    "consent_status": status_value,
                    "updated_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        Ok(())
    }
}
