use crate::auth::Identity;
use crate::error::DocumentError;
use crate::storage::models::DocumentRecord;

/// Operations an authenticated caller can attempt on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Download,
    Preview,
    /// Read the share settings, including the share code
    ViewShare,
    /// Create, update or cancel the share link
    ManageShare,
}

/// Single ownership/visibility policy for every document endpoint.
pub fn authorize(
    action: Action,
    document: &DocumentRecord,
    identity: &Identity,
) -> Result<(), DocumentError> {
    let is_owner = document.owner_id == identity.user_id;
    let allowed = match action {
        Action::Download | Action::Preview => is_owner || document.is_public,
        Action::ViewShare | Action::ManageShare => is_owner,
    };

    if allowed {
        Ok(())
    } else {
        let message = match action {
            Action::Download => "Not authorized to download this document",
            Action::Preview => "Not authorized to preview this document",
            Action::ViewShare | Action::ManageShare => "Not authorized",
        };
        Err(DocumentError::Forbidden(message.to_string()))
    }
}

pub fn authorize_upload(identity: &Identity) -> Result<(), DocumentError> {
    if identity.can_upload {
        Ok(())
    } else {
        Err(DocumentError::Forbidden("Not authorized".to_string()))
    }
}
