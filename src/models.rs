#![allow(proc_macro_derive_resolution_fallback)] // See: https://github.com/diesel-rs/diesel/issues/1785

use super::schema::*;
use chrono::{DateTime, Utc};

/// A local account provisioned on first successful OAuth login.
///
/// The email is the join key between the external identity and this row;
/// it carries a UNIQUE constraint (see migrations) so concurrent first
/// logins for the same address cannot produce two accounts.
#[derive(Debug, Serialize, Queryable)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub picture: Option<String>,
}

#[derive(Insertable)]
#[table_name = "users"]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub picture: Option<&'a str>,
}

#[derive(Debug, Serialize, Queryable)]
pub struct Region {
    pub id: i32,
    pub name: String,
    pub user_id: i32,
}

/// A catalog entry. `region` holds the denormalized region name the entry
/// was filed under, alongside the `region_id` foreign key.
#[derive(Debug, Serialize, Queryable)]
pub struct Whiskey {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub whiskey_type: String,
    pub manufacturer: String,
    pub abv: String,
    pub proof: Option<String>,
    pub img_name: Option<String>,
    pub date_added: DateTime<Utc>,
    pub region_id: i32,
    pub region: String,
    pub user_id: i32,
}

#[derive(Insertable)]
#[table_name = "whiskeys"]
pub struct NewWhiskey<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub whiskey_type: &'a str,
    pub manufacturer: &'a str,
    pub abv: &'a str,
    pub proof: Option<&'a str>,
    pub img_name: Option<&'a str>,
    pub region_id: &'a i32,
    pub region: &'a str,
    pub user_id: &'a i32,
}

/// Partial update for an existing whiskey; `None` fields are left untouched.
#[derive(Default, AsChangeset)]
#[table_name = "whiskeys"]
pub struct WhiskeyChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub whiskey_type: Option<String>,
    pub manufacturer: Option<String>,
    pub abv: Option<String>,
    pub proof: Option<String>,
    pub img_name: Option<String>,
    pub region_id: Option<i32>,
    pub region: Option<String>,
}

impl WhiskeyChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.whiskey_type.is_none()
            && self.manufacturer.is_none()
            && self.abv.is_none()
            && self.proof.is_none()
            && self.img_name.is_none()
            && self.region_id.is_none()
            && self.region.is_none()
    }
}
