// Lead Conversion - find-or-create a client for a lead and mark the lead won

use inspectos_shared::NewClient;
use tracing::{debug, info};
use uuid::Uuid;

use super::store::EntityStore;
use crate::database::StoreResult;

/// How the client for a converted lead was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientResolution {
    Linked(Uuid),
    MatchedEmail(Uuid),
    MatchedName(Uuid),
    Created(Uuid),
}

impl ClientResolution {
    pub fn client_id(&self) -> Uuid {
        match *self {
            Self::Linked(id) | Self::MatchedEmail(id) | Self::MatchedName(id) | Self::Created(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted(ClientResolution),
    LeadNotFound,
}

/// Convert a lead into a client.
///
/// Resolution order: the lead's existing client link, a case-insensitive
/// email match, a case-insensitive name match, then a new client. The
/// client id is written back onto the lead before the optional delete so
/// a retried conversion resolves to the same client.
pub async fn convert_lead(
    entities: &dyn EntityStore,
    tenant_id: Uuid,
    lead_id: Uuid,
    delete_lead: bool,
) -> StoreResult<ConversionOutcome> {
    let Some(lead) = entities.find_lead(tenant_id, lead_id).await? else {
        debug!(%tenant_id, %lead_id, "Lead not found for conversion");
        return Ok(ConversionOutcome::LeadNotFound);
    };

    let resolution = if let Some(client_id) = lead.client_id {
        ClientResolution::Linked(client_id)
    } else if let Some(client_id) = match non_blank(lead.email.as_deref()) {
        Some(email) => entities.find_client_by_email(tenant_id, email).await?,
        None => None,
    } {
        ClientResolution::MatchedEmail(client_id)
    } else if let Some(client_id) = match non_blank(Some(&lead.name)) {
        Some(name) => entities.find_client_by_name(tenant_id, name).await?,
        None => None,
    } {
        ClientResolution::MatchedName(client_id)
    } else {
        let client_id = entities.create_client(tenant_id, &NewClient::from(&lead)).await?;
        ClientResolution::Created(client_id)
    };

    let client_id = resolution.client_id();
    entities.mark_lead_won(tenant_id, lead_id, client_id).await?;

    if delete_lead {
        entities.delete_lead(tenant_id, lead_id).await?;
    }

    info!(%tenant_id, %lead_id, %client_id, ?resolution, delete_lead, "Lead converted to client");
    Ok(ConversionOutcome::Converted(resolution))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
