use std::path::Path;

use jiff::Timestamp;
use tracing::{error, info, warn};

use crate::{
    models::{
        AttachmentId, UserId,
        attachment::{Attachable, Attachment, AttachmentView},
        store::Store,
        user::User,
    },
    policy::{Action, Target},
    services::{
        Context, ServiceError, authorize, max_length, project_viewers, release_files, required,
        views,
    },
};

const DEFAULT_MIME: &str = "application/octet-stream";

/// Content type recorded for an upload, by extension.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "zip" => "application/zip",
        "rar" => "application/vnd.rar",
        _ => DEFAULT_MIME,
    }
}

fn find_attachment(store: &Store, attachment_id: AttachmentId) -> Result<Attachment, ServiceError> {
    store
        .get_attachment(attachment_id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("Attachment", attachment_id))
}

fn missing(attachable: Attachable) -> ServiceError {
    let entity = match attachable {
        Attachable::Project(_) => "Project",
        Attachable::Task(_) => "Task",
        Attachable::Comment(_) => "Comment",
    };
    ServiceError::not_found(entity, attachable.id())
}

fn forget_project_detail(ctx: &mut Context<'_>, attachable: Attachable, extra: &[UserId]) {
    let Some(project_id) = ctx.store.attachable_project(attachable).map(|p| p.id) else {
        return;
    };
    let mut viewers = project_viewers(ctx.store, project_id);
    viewers.extend(extra.iter().copied());
    ctx.forget_project_detail(project_id, &viewers);
}

pub fn list_attachments(
    ctx: &Context<'_>,
    actor: &User,
    attachable: Attachable,
) -> Result<Vec<AttachmentView>, ServiceError> {
    let store = &*ctx.store;
    let on = store
        .resolve_attachable(attachable)
        .ok_or_else(|| missing(attachable))?;
    authorize(store, actor, Action::View, Target::AttachmentOn(on))?;
    Ok(store
        .attachments_on(attachable)
        .map(|a| views::attachment_view(store, a))
        .collect())
}

pub fn show_attachment(
    ctx: &Context<'_>,
    actor: &User,
    attachment_id: AttachmentId,
) -> Result<AttachmentView, ServiceError> {
    let attachment = find_attachment(ctx.store, attachment_id)?;
    authorize(ctx.store, actor, Action::View, Target::Attachment(&attachment))?;
    Ok(views::attachment_view(ctx.store, &attachment))
}

/// The stored bytes of an attachment, under the same rule as viewing it.
pub fn download_attachment(
    ctx: &Context<'_>,
    actor: &User,
    attachment_id: AttachmentId,
) -> Result<(AttachmentView, Vec<u8>), ServiceError> {
    let view = show_attachment(ctx, actor, attachment_id)?;
    let attachment = &view.attachment;
    if !ctx.blobs.exists(&attachment.disk, &attachment.path) {
        warn!(attachment_id, path = %attachment.path, "stored file missing");
        return Err(ServiceError::NotFound(format!(
            "The file of attachment #{attachment_id} is no longer stored."
        )));
    }
    let bytes = ctx.blobs.read(&attachment.disk, &attachment.path)?;
    Ok((view, bytes))
}

pub struct UploadParameters {
    pub attachable: Attachable,
    /// Name the client gave the file
    pub file_name: String,
    pub bytes: Vec<u8>,
}

fn validate_upload(ctx: &Context<'_>, parameters: &UploadParameters) -> Result<String, ServiceError> {
    required("file", &parameters.file_name)?;
    max_length("file name", &parameters.file_name, 255)?;
    let settings = ctx.settings;
    if parameters.bytes.len() as u64 > settings.max_upload_bytes {
        return Err(ServiceError::Validation(format!(
            "The file field must not be greater than {} kilobytes.",
            settings.max_upload_bytes / 1024
        )));
    }
    let extension = Path::new(&parameters.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !settings.is_allowed_extension(&extension) {
        return Err(ServiceError::Validation(format!(
            "The file field must be a file of type: {}.",
            settings.allowed_extensions.join(", ")
        )));
    }
    Ok(extension)
}

/// Stores the bytes on the blob disk and records the attachment. The stored
/// file is released again when the record cannot be saved.
pub fn upload_attachment(
    ctx: &mut Context<'_>,
    actor: &User,
    parameters: UploadParameters,
) -> Result<AttachmentView, ServiceError> {
    let attachable = parameters.attachable;
    let on = ctx
        .store
        .resolve_attachable(attachable)
        .ok_or_else(|| missing(attachable))?;
    authorize(ctx.store, actor, Action::Create, Target::AttachmentOn(on))?;
    let extension = validate_upload(ctx, &parameters)?;

    let stored = ctx.blobs.store(&parameters.bytes, &parameters.file_name)?;
    let now = Timestamp::now();
    let attachment_id = ctx.store.add_attachment(Attachment {
        id: 0,
        user_id: actor.id,
        attachable,
        disk: stored.disk,
        path: stored.path,
        file_name: parameters.file_name.trim().to_string(),
        file_size: parameters.bytes.len() as u64,
        mime_type: mime_for_extension(&extension).to_string(),
        created_at: now,
        updated_at: now,
    });
    if let Err(e) = ctx.save() {
        error!(attachment_id, error = %e, "failed to record upload, releasing file");
        if let Some(orphan) = ctx.store.remove_attachment(attachment_id) {
            release_files(ctx.blobs, &[orphan]);
        }
        return Err(e);
    }
    info!(attachment_id, on = %attachable, user_id = actor.id, "attachment uploaded");

    forget_project_detail(ctx, attachable, &[actor.id]);
    let attachment = find_attachment(ctx.store, attachment_id)?;
    Ok(views::attachment_view(ctx.store, &attachment))
}

#[derive(Default)]
pub struct UpdateAttachmentParameters {
    pub file_name: Option<String>,
}

/// Renames an attachment. The stored file keeps its path.
pub fn update_attachment(
    ctx: &mut Context<'_>,
    actor: &User,
    attachment_id: AttachmentId,
    parameters: UpdateAttachmentParameters,
) -> Result<AttachmentView, ServiceError> {
    let attachment = find_attachment(ctx.store, attachment_id)?;
    authorize(ctx.store, actor, Action::Update, Target::Attachment(&attachment))?;
    if let Some(name) = &parameters.file_name {
        required("file name", name)?;
        max_length("file name", name, 255)?;
    }

    let Some(stored) = ctx.store.get_attachment_mut(attachment_id) else {
        return Err(ServiceError::not_found("Attachment", attachment_id));
    };
    if let Some(name) = parameters.file_name {
        stored.file_name = name.trim().to_string();
    }
    stored.updated_at = Timestamp::now();
    let updated = stored.clone();
    ctx.save()?;
    info!(attachment_id, user_id = actor.id, "attachment updated");

    forget_project_detail(ctx, attachment.attachable, &[actor.id]);
    Ok(views::attachment_view(ctx.store, &updated))
}

/// Removes the record, then the stored file. A file that is already gone or
/// cannot be deleted is logged and the deletion still succeeds.
pub fn delete_attachment(
    ctx: &mut Context<'_>,
    actor: &User,
    attachment_id: AttachmentId,
) -> Result<(), ServiceError> {
    let attachment = find_attachment(ctx.store, attachment_id)?;
    authorize(ctx.store, actor, Action::Delete, Target::Attachment(&attachment))?;

    forget_project_detail(ctx, attachment.attachable, &[actor.id]);
    let removed = ctx.store.remove_attachment(attachment_id);
    ctx.save()?;
    release_files(ctx.blobs, removed.as_slice());
    info!(attachment_id, user_id = actor.id, "attachment deleted");
    Ok(())
}
