use actix_files::NamedFile;
use actix_web::web;
use regex::Regex;

use super::error::Error;
use crate::AppState;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_.-]").unwrap();
}

/// Image uploads are restricted by extension, matching the catalog's
/// png/jpg/jpeg/gif whitelist.
pub fn allowed_file(filename: &str) -> bool {
    match filename.rfind('.') {
        Some(idx) if idx + 1 < filename.len() => {
            let ext = filename[idx + 1..].to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// Reduces a client-supplied filename to something safe to join onto the
/// upload directory: path components are stripped and anything outside
/// `[A-Za-z0-9_.-]` is squashed to an underscore.
pub fn secure_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    UNSAFE_CHARS
        .replace_all(base, "_")
        .trim_matches('.')
        .to_owned()
}

/// Route handler for `GET /uploads/{filename}`.
pub async fn uploaded_file(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<NamedFile, Error> {
    let filename = secure_filename(&path);
    if filename.is_empty() {
        return Err(Error::NotFound);
    }
    NamedFile::open(data.upload_dir.join(filename)).map_err(|_| Error::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_whitelisted_image_extensions() {
        assert!(allowed_file("glen.jpg"));
        assert!(allowed_file("glen.tasting.JPEG"));
        assert!(allowed_file("bottle.png"));
        assert!(allowed_file("label.gif"));
    }

    #[test]
    fn rejects_everything_else() {
        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("script.sh"));
        assert!(!allowed_file("no-extension"));
        assert!(!allowed_file("trailing-dot."));
        assert!(!allowed_file(""));
    }

    #[test]
    fn filenames_lose_path_components() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename(r"C:\photos\me.jpg"), "me.jpg");
        assert_eq!(secure_filename("plain.png"), "plain.png");
    }

    #[test]
    fn unsafe_characters_are_squashed() {
        assert_eq!(secure_filename("my photo.jpg"), "my_photo.jpg");
        assert_eq!(secure_filename("càsk strength!.png"), "c_sk_strength_.png");
    }

    #[test]
    fn dot_only_names_reduce_to_nothing() {
        assert_eq!(secure_filename(".."), "");
        assert_eq!(secure_filename("."), "");
    }
}
