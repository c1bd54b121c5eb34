use serde::Serialize;

use super::models::{Region, User, Whiskey};

#[derive(Serialize)]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Envelope type for page-style API responses. Flash notices drained from
/// the session ride along in `messages`.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub status: ResponseStatus,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<String>>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn new(data: T) -> ApiResponse<T> {
        ApiResponse {
            status: ResponseStatus::Success,
            data,
            messages: None,
        }
    }

    pub fn with_messages(data: T, messages: Vec<String>) -> ApiResponse<T> {
        ApiResponse {
            status: ResponseStatus::Success,
            data,
            messages: if messages.is_empty() {
                None
            } else {
                Some(messages)
            },
        }
    }
}

/*************************************/
/** Feed items                      **/
/*************************************/

/// The public field list for a whiskey entry in the JSON and XML feeds.
#[derive(Serialize)]
pub struct BrandFeedItem {
    pub id: i32,
    pub name: String,
    pub img_name: Option<String>,
    pub description: Option<String>,
    pub manufacturer: String,
    pub abv: String,
    pub proof: Option<String>,
    #[serde(rename = "type")]
    pub whiskey_type: String,
    pub region: String,
}

impl From<Whiskey> for BrandFeedItem {
    fn from(w: Whiskey) -> BrandFeedItem {
        BrandFeedItem {
            id: w.id,
            name: w.name,
            img_name: w.img_name,
            description: w.description,
            manufacturer: w.manufacturer,
            abv: w.abv,
            proof: w.proof,
            whiskey_type: w.whiskey_type,
            region: w.region,
        }
    }
}

#[derive(Serialize)]
pub struct RegionFeedItem {
    pub id: i32,
    pub name: String,
}

impl From<Region> for RegionFeedItem {
    fn from(r: Region) -> RegionFeedItem {
        RegionFeedItem {
            id: r.id,
            name: r.name,
        }
    }
}

// Feed envelopes keyed the way the catalog has always published them.

#[derive(Serialize)]
pub struct AllBrands {
    #[serde(rename = "AllBrands")]
    pub all_brands: Vec<BrandFeedItem>,
}

#[derive(Serialize)]
pub struct AllRegions {
    #[serde(rename = "AllRegions")]
    pub all_regions: Vec<RegionFeedItem>,
}

#[derive(Serialize)]
pub struct WhiskeyInfo {
    #[serde(rename = "WhiskeyInfo")]
    pub whiskey_info: Vec<BrandFeedItem>,
}

#[derive(Serialize)]
pub struct RegionInfo {
    #[serde(rename = "RegionInfo")]
    pub region_info: Vec<RegionFeedItem>,
}

/// Creator attribution shown on region and brand pages.
#[derive(Serialize)]
pub struct Creator {
    pub name: String,
    pub picture: Option<String>,
}

impl From<User> for Creator {
    fn from(u: User) -> Creator {
        Creator {
            name: u.name,
            picture: u.picture,
        }
    }
}

/*************************************/
/** XML feeds                       **/
/*************************************/

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn push_element(out: &mut String, indent: &str, tag: &str, value: &str) {
    out.push_str(indent);
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&xml_escape(value));
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

pub fn brands_xml(items: &[BrandFeedItem]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<all_brands>\n");
    for item in items {
        out.push_str("  <brand>\n");
        push_element(&mut out, "    ", "id", &item.id.to_string());
        push_element(&mut out, "    ", "name", &item.name);
        if let Some(img_name) = &item.img_name {
            push_element(&mut out, "    ", "img_name", img_name);
        }
        if let Some(description) = &item.description {
            push_element(&mut out, "    ", "description", description);
        }
        push_element(&mut out, "    ", "manufacturer", &item.manufacturer);
        push_element(&mut out, "    ", "abv", &item.abv);
        if let Some(proof) = &item.proof {
            push_element(&mut out, "    ", "proof", proof);
        }
        push_element(&mut out, "    ", "type", &item.whiskey_type);
        push_element(&mut out, "    ", "region", &item.region);
        out.push_str("  </brand>\n");
    }
    out.push_str("</all_brands>\n");
    out
}

pub fn regions_xml(items: &[RegionFeedItem]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<all_regions>\n");
    for item in items {
        out.push_str("  <region>\n");
        push_element(&mut out, "    ", "id", &item.id.to_string());
        push_element(&mut out, "    ", "name", &item.name);
        out.push_str("  </region>\n");
    }
    out.push_str("</all_regions>\n");
    out
}
