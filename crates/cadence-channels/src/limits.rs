use cadence_core::{ChannelLimits, MediaKind, VariantContent};

use crate::types::{FailureCode, PublishFailure};

/// Validate `content` against platform `limits`.
///
/// Returns a permanent `CONTENT_REJECTED` failure describing the first
/// violated constraint, or `None` when the content fits. Text length is
/// counted in Unicode scalar values.
pub fn check_limits(content: &VariantContent, limits: &ChannelLimits) -> Option<PublishFailure> {
    let text_len = content.text.chars().count();
    if text_len > limits.max_text_length {
        return Some(reject(format!(
            "text is {text_len} characters, limit is {}",
            limits.max_text_length
        )));
    }

    let images = content.count_media(MediaKind::Image);
    if images > limits.max_images {
        return Some(reject(format!(
            "{images} images attached, limit is {}",
            limits.max_images
        )));
    }

    let videos = content.count_media(MediaKind::Video);
    if videos > limits.max_videos {
        return Some(reject(format!(
            "{videos} videos attached, limit is {}",
            limits.max_videos
        )));
    }

    if content.media.len() > limits.max_media {
        return Some(reject(format!(
            "{} attachments, limit is {}",
            content.media.len(),
            limits.max_media
        )));
    }

    if content.text.trim().is_empty() && content.media.is_empty() {
        return Some(reject("variant has neither text nor media".to_string()));
    }

    None
}

fn reject(message: String) -> PublishFailure {
    PublishFailure::permanent(FailureCode::ContentRejected, message)
}
