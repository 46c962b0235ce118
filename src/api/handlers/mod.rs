mod admin;
mod documents;
mod objects;
mod shares;

pub use admin::{admin_purge, health};
pub use documents::{download_document, my_documents, preview_document, upload_document};
pub use objects::serve_object;
pub use shares::{
    access_shared, cancel_share, check_shared, create_share, get_share, list_shared,
    update_share,
};
