use actix_web::{web, HttpRequest, HttpResponse};

use std::fs;

use super::api::{
    self, AllBrands, AllRegions, ApiResponse, BrandFeedItem, Creator, RegionFeedItem, RegionInfo,
    WhiskeyInfo,
};
use super::auth::{redirect, require_login};
use super::db::{
    self, CreateWhiskey, DeleteWhiskey, GetBrandNames, GetLatestWhiskeys, GetRegionById,
    GetRegionByName, GetRegions, GetTopContributors, GetUserById, GetWhiskeyById, GetWhiskeys,
    GetWhiskeysByName, GetWhiskeysInRegion, UpdateWhiskey,
};
use super::error::{Error, Result};
use super::models::WhiskeyChanges;
use super::session;
use super::upload;
use crate::AppState;

/// How many entries the landing page shows per list.
const HOME_PAGE_LIMIT: i64 = 4;

#[derive(Serialize)]
pub struct Contributor {
    pub name: String,
    pub picture: Option<String>,
    pub whiskeys: i64,
}

#[derive(Serialize)]
struct HomePage {
    latest: Vec<BrandFeedItem>,
    top_contributors: Vec<Contributor>,
}

/// Route handler for `GET /`: the latest additions plus the busiest
/// contributors.
pub async fn show_app(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let (sid, mut login_session) = data.sessions.resolve(&req);

    let latest = db::execute(&data.db, GetLatestWhiskeys { limit: HOME_PAGE_LIMIT }).await?;
    let top = db::execute(&data.db, GetTopContributors { limit: HOME_PAGE_LIMIT }).await?;

    let messages = login_session.take_flash();
    if !messages.is_empty() {
        data.sessions.put(&sid, login_session);
    }

    let page = HomePage {
        latest: latest.into_iter().map(BrandFeedItem::from).collect(),
        top_contributors: top
            .into_iter()
            .map(|(user, count)| Contributor {
                name: user.name,
                picture: user.picture,
                whiskeys: count,
            })
            .collect(),
    };

    Ok(HttpResponse::Ok()
        .cookie(session::session_cookie(&sid))
        .json(ApiResponse::with_messages(page, messages)))
}

/// Route handler for `GET /regions`.
pub async fn show_regions(data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let (sid, mut login_session) = data.sessions.resolve(&req);

    let regions = db::execute(&data.db, GetRegions).await?;

    let messages = login_session.take_flash();
    if !messages.is_empty() {
        data.sessions.put(&sid, login_session);
    }

    let items: Vec<RegionFeedItem> = regions.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok()
        .cookie(session::session_cookie(&sid))
        .json(ApiResponse::with_messages(items, messages)))
}

#[derive(Serialize)]
struct RegionBrand {
    #[serde(flatten)]
    brand: BrandFeedItem,
    created_by: Creator,
}

#[derive(Serialize)]
struct RegionPage {
    region: String,
    brands: Vec<RegionBrand>,
}

/// Route handler for `GET /regions/{region}`; unknown names 404.
pub async fn single_region(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let region = db::execute(
        &data.db,
        GetRegionByName {
            name: path.into_inner(),
        },
    )
    .await?
    .ok_or(Error::NotFound)?;

    let brands = db::execute(
        &data.db,
        GetWhiskeysInRegion {
            region: region.name.clone(),
        },
    )
    .await?;

    let page = RegionPage {
        region: region.name,
        brands: brands
            .into_iter()
            .map(|(whiskey, user)| RegionBrand {
                brand: whiskey.into(),
                created_by: user.into(),
            })
            .collect(),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::new(page)))
}

/// Route handler for `GET /brands`: the brand names only, alphabetized.
pub async fn show_brands(data: web::Data<AppState>) -> Result<HttpResponse> {
    let names = db::execute(&data.db, GetBrandNames).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(names)))
}

#[derive(Serialize)]
struct BrandPage {
    brand: String,
    entries: Vec<BrandFeedItem>,
    creator: Creator,
}

/// Route handler for `GET /brands/{brand}`; unknown names 404.
pub async fn single_brand(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let entries = db::execute(
        &data.db,
        GetWhiskeysByName {
            name: path.into_inner(),
        },
    )
    .await?;

    let (brand, creator_id) = match entries.first() {
        Some(first) => (first.name.clone(), first.user_id),
        None => return Err(Error::NotFound),
    };

    let creator = db::execute(&data.db, GetUserById { id: creator_id })
        .await?
        .ok_or(Error::NotFound)?;

    let page = BrandPage {
        brand,
        entries: entries.into_iter().map(Into::into).collect(),
        creator: creator.into(),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::new(page)))
}

/*************************************/
/** Whiskey CRUD                    **/
/*************************************/

#[derive(Deserialize)]
pub struct WhiskeyForm {
    name: String,
    description: String,
    #[serde(rename = "type")]
    whiskey_type: String,
    manufacturer: String,
    abv: String,
    #[serde(default)]
    proof: Option<String>,
    region: String,
    #[serde(default)]
    img_name: Option<String>,
}

/// Normalizes an optional form field: trimmed, with empty meaning absent.
fn nonempty(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn missing_required(form: &WhiskeyForm) -> bool {
    form.name.trim().is_empty()
        || form.description.trim().is_empty()
        || form.whiskey_type.trim().is_empty()
        || form.manufacturer.trim().is_empty()
        || form.abv.trim().is_empty()
        || form.region.trim().is_empty()
}

/// Validates and sanitizes the optional image field. `Err` means the
/// extension is outside the whitelist.
fn image_name(field: Option<String>) -> ::std::result::Result<Option<String>, ()> {
    match nonempty(field) {
        None => Ok(None),
        Some(raw) => {
            if !upload::allowed_file(&raw) {
                return Err(());
            }
            Ok(Some(upload::secure_filename(&raw)))
        }
    }
}

/// The image file to remove after an edit lands: the previous file, and only
/// when a different one replaced it.
fn stale_image<'a>(old: Option<&'a str>, new: Option<&'a str>) -> Option<&'a str> {
    match (old, new) {
        (Some(old), Some(new)) if old != new => Some(old),
        _ => None,
    }
}

fn bad_request(message: &str, sid: &str) -> HttpResponse {
    HttpResponse::BadRequest()
        .cookie(session::session_cookie(sid))
        .json(message)
}

/// Route handler for `POST /whiskey/new` (login required).
pub async fn new_whiskey(
    data: web::Data<AppState>,
    form: web::Form<WhiskeyForm>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let (sid, mut login_session) = data.sessions.resolve(&req);
    let user_id = match require_login(&login_session, &sid) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let form = form.into_inner();
    if missing_required(&form) {
        return Ok(bad_request("Please enter all the fields.", &sid));
    }

    let img_name = match image_name(form.img_name) {
        Ok(img) => img,
        Err(()) => return Ok(bad_request("File type not allowed.", &sid)),
    };

    let region = db::execute(
        &data.db,
        GetRegionByName {
            name: form.region.trim().to_owned(),
        },
    )
    .await?
    .ok_or(Error::NotFound)?;

    let whiskey = db::execute(
        &data.db,
        CreateWhiskey {
            name: form.name.trim().to_owned(),
            description: Some(form.description.trim().to_owned()),
            whiskey_type: form.whiskey_type.trim().to_owned(),
            manufacturer: form.manufacturer.trim().to_owned(),
            abv: form.abv.trim().to_owned(),
            proof: nonempty(form.proof),
            img_name,
            region_id: region.id,
            region: region.name,
            user_id,
        },
    )
    .await?;

    login_session.flash(format!("New Whiskey {} Successfully Added", whiskey.name));
    data.sessions.put(&sid, login_session);
    Ok(redirect("/", &sid))
}

#[derive(Deserialize)]
pub struct EditWhiskeyForm {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "type")]
    whiskey_type: Option<String>,
    #[serde(default)]
    manufacturer: Option<String>,
    #[serde(default)]
    abv: Option<String>,
    #[serde(default)]
    proof: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    img_name: Option<String>,
}

/// Route handler for `POST /brands/{id}/edit` (login required).
///
/// Empty fields leave the entry untouched. A user editing someone else's
/// entry is soft-denied: a notice is flashed and they are bounced home.
pub async fn edit_whiskey(
    data: web::Data<AppState>,
    path: web::Path<i32>,
    form: web::Form<EditWhiskeyForm>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let (sid, mut login_session) = data.sessions.resolve(&req);
    let user_id = match require_login(&login_session, &sid) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let id = path.into_inner();
    let whiskey = db::execute(&data.db, GetWhiskeyById { id })
        .await?
        .ok_or(Error::NotFound)?;

    if whiskey.user_id != user_id {
        login_session.flash(format!("You are not authorized to edit {}.", whiskey.name));
        login_session.flash("Please create your own whiskey in order to edit or delete.");
        data.sessions.put(&sid, login_session);
        return Ok(redirect("/", &sid));
    }

    let form = form.into_inner();
    let mut changes = WhiskeyChanges::default();
    changes.name = nonempty(form.name);
    changes.description = nonempty(form.description);
    changes.whiskey_type = nonempty(form.whiskey_type);
    changes.manufacturer = nonempty(form.manufacturer);
    changes.abv = nonempty(form.abv);
    changes.proof = nonempty(form.proof);

    changes.img_name = match image_name(form.img_name) {
        Err(()) => return Ok(bad_request("File type not allowed.", &sid)),
        Ok(img) => img,
    };

    if let Some(region_name) = nonempty(form.region) {
        let region = db::execute(&data.db, GetRegionByName { name: region_name })
            .await?
            .ok_or(Error::NotFound)?;
        changes.region_id = Some(region.id);
        changes.region = Some(region.name);
    }

    let new_image = changes.img_name.clone();
    let updated = db::execute(&data.db, UpdateWhiskey { id, changes }).await?;

    // Drop the replaced image only once the row points at the new one, so a
    // failed update never leaves the entry referencing a deleted file.
    if let Some(old) = stale_image(whiskey.img_name.as_deref(), new_image.as_deref()) {
        let stale = data.upload_dir.join(old);
        if let Err(e) = fs::remove_file(&stale) {
            warn!("could not remove stale image {:?}: {}", stale, e);
        }
    }

    login_session.flash(format!("{} successfully edited.", updated.name));
    data.sessions.put(&sid, login_session);
    Ok(redirect("/", &sid))
}

/// Route handler for `POST /brands/{id}/delete` (login required). Same
/// soft-denial rule as editing.
pub async fn delete_whiskey(
    data: web::Data<AppState>,
    path: web::Path<i32>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let (sid, mut login_session) = data.sessions.resolve(&req);
    let user_id = match require_login(&login_session, &sid) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let id = path.into_inner();
    let whiskey = db::execute(&data.db, GetWhiskeyById { id })
        .await?
        .ok_or(Error::NotFound)?;

    if whiskey.user_id != user_id {
        login_session.flash(format!(
            "You are not authorized to delete {}.",
            whiskey.name
        ));
        login_session.flash("Edit and delete whiskeys you have created only.");
        data.sessions.put(&sid, login_session);
        return Ok(redirect("/", &sid));
    }

    db::execute(&data.db, DeleteWhiskey { id }).await?;

    if let Some(img) = &whiskey.img_name {
        let stale = data.upload_dir.join(img);
        if let Err(e) = fs::remove_file(&stale) {
            warn!("could not remove image {:?}: {}", stale, e);
        }
    }

    login_session.flash(format!("{} Successfully Deleted", whiskey.name));
    data.sessions.put(&sid, login_session);
    Ok(redirect("/", &sid))
}

/*************************************/
/** Read-only feeds                 **/
/*************************************/

pub async fn all_brands_json(data: web::Data<AppState>) -> Result<HttpResponse> {
    let brands = db::execute(&data.db, GetWhiskeys).await?;
    Ok(HttpResponse::Ok().json(AllBrands {
        all_brands: brands.into_iter().map(Into::into).collect(),
    }))
}

pub async fn all_regions_json(data: web::Data<AppState>) -> Result<HttpResponse> {
    let regions = db::execute(&data.db, GetRegions).await?;
    Ok(HttpResponse::Ok().json(AllRegions {
        all_regions: regions.into_iter().map(Into::into).collect(),
    }))
}

pub async fn single_brand_json(
    data: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse> {
    let whiskey = db::execute(
        &data.db,
        GetWhiskeyById {
            id: path.into_inner(),
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(WhiskeyInfo {
        whiskey_info: whiskey.into_iter().map(Into::into).collect(),
    }))
}

pub async fn single_region_json(
    data: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse> {
    let region = db::execute(
        &data.db,
        GetRegionById {
            id: path.into_inner(),
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(RegionInfo {
        region_info: region.into_iter().map(Into::into).collect(),
    }))
}

pub async fn all_brands_xml(data: web::Data<AppState>) -> Result<HttpResponse> {
    let brands = db::execute(&data.db, GetWhiskeys).await?;
    let items: Vec<BrandFeedItem> = brands.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok()
        .content_type("application/xml")
        .body(api::brands_xml(&items)))
}

pub async fn all_regions_xml(data: web::Data<AppState>) -> Result<HttpResponse> {
    let regions = db::execute(&data.db, GetRegions).await?;
    let items: Vec<RegionFeedItem> = regions.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok()
        .content_type("application/xml")
        .body(api::regions_xml(&items)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> WhiskeyForm {
        WhiskeyForm {
            name: "Glenmorangie".into(),
            description: "Highland single malt".into(),
            whiskey_type: "Single malt".into(),
            manufacturer: "Brown-Forman".into(),
            abv: "40.00".into(),
            proof: None,
            region: "Scotland".into(),
            img_name: None,
        }
    }

    #[test]
    fn complete_form_passes_validation() {
        assert!(!missing_required(&form()));
    }

    #[test]
    fn blank_required_field_fails_validation() {
        let mut f = form();
        f.abv = "   ".into();
        assert!(missing_required(&f));
    }

    #[test]
    fn nonempty_trims_and_drops_blanks() {
        assert_eq!(nonempty(Some("  Islay  ".into())), Some("Islay".to_owned()));
        assert_eq!(nonempty(Some("   ".into())), None);
        assert_eq!(nonempty(None), None);
    }

    #[test]
    fn stale_image_is_the_replaced_file_only() {
        assert_eq!(
            stale_image(Some("old.jpg"), Some("new.jpg")),
            Some("old.jpg")
        );
        assert_eq!(stale_image(Some("same.jpg"), Some("same.jpg")), None);
        assert_eq!(stale_image(Some("old.jpg"), None), None);
        assert_eq!(stale_image(None, Some("new.jpg")), None);
    }

    #[test]
    fn image_field_is_optional_but_whitelisted() {
        assert_eq!(image_name(None), Ok(None));
        assert_eq!(image_name(Some("".into())), Ok(None));
        assert_eq!(
            image_name(Some("bottle shot.jpg".into())),
            Ok(Some("bottle_shot.jpg".to_owned()))
        );
        assert_eq!(image_name(Some("malware.exe".into())), Err(()));
    }
}
