use actix_web::web;
use diesel;
use diesel::prelude::*;
use diesel::r2d2;
use diesel::result::DatabaseErrorKind;
use diesel::result::Error as DieselError;
use diesel::sql_types::{BigInt, Integer, Nullable, Text};

use std::marker::Send;

use super::error::Result;
use super::models;
use super::schema;

pub type Pool = r2d2::Pool<r2d2::ConnectionManager<PgConnection>>;
pub type Connection = r2d2::PooledConnection<r2d2::ConnectionManager<PgConnection>>;

pub trait Query {
    type Output: Send;

    fn execute(&self, conn: Connection) -> Result<Self::Output>;
}

/// Runs a query on the blocking thread pool so diesel's synchronous IO never
/// stalls the request reactor.
pub async fn execute<T>(pool: &Pool, query: T) -> Result<T::Output>
where
    T: Query + Send + 'static,
    T::Output: 'static,
{
    let pool = pool.clone();

    Ok(web::block(move || query.execute(pool.get()?)).await?)
}

/*************************************/
/** Account linker                  **/
/*************************************/

/// Resolves a local account for a verified external identity, creating one
/// on first login. This is the only place new `users` rows are created.
pub struct LookupOrCreateUser {
    pub name: String,
    pub email: String,
    pub picture: Option<String>,
}

impl Query for LookupOrCreateUser {
    type Output = models::User;

    fn execute(&self, conn: Connection) -> Result<models::User> {
        use self::schema::users::dsl::*;

        if let Some(user) = users
            .filter(email.eq(&self.email))
            .first::<models::User>(&conn)
            .optional()?
        {
            return Ok(user);
        }

        let new_user = models::NewUser {
            name: &self.name,
            email: &self.email,
            picture: self.picture.as_deref(),
        };

        // Two first logins for the same address may race past the lookup
        // above. The UNIQUE constraint on email turns the loser's insert
        // into a conflict, which means the row now exists: re-fetch it.
        match diesel::insert_into(users).values(&new_user).get_result(&conn) {
            Ok(user) => Ok(user),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(users.filter(email.eq(&self.email)).first(&conn)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/*************************************/
/** User queries                    **/
/*************************************/

pub struct GetUserById {
    pub id: i32,
}

impl Query for GetUserById {
    type Output = Option<models::User>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::users::dsl::*;

        Ok(users.find(self.id).first(&conn).optional()?)
    }
}

/// Top contributors by number of whiskeys created, busiest first.
pub struct GetTopContributors {
    pub limit: i64,
}

#[derive(QueryableByName)]
struct ContributorRow {
    #[sql_type = "Integer"]
    id: i32,
    #[sql_type = "Text"]
    name: String,
    #[sql_type = "Text"]
    email: String,
    #[sql_type = "Nullable<Text>"]
    picture: Option<String>,
    #[sql_type = "BigInt"]
    whiskeys: i64,
}

impl Query for GetTopContributors {
    type Output = Vec<(models::User, i64)>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        let rows: Vec<ContributorRow> = diesel::sql_query(
            "SELECT u.id, u.name, u.email, u.picture, count(w.id) AS whiskeys \
             FROM whiskeys w INNER JOIN users u ON u.id = w.user_id \
             GROUP BY u.id, u.name, u.email, u.picture \
             ORDER BY whiskeys DESC LIMIT $1",
        )
        .bind::<BigInt, _>(self.limit)
        .load(&conn)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    models::User {
                        id: row.id,
                        name: row.name,
                        email: row.email,
                        picture: row.picture,
                    },
                    row.whiskeys,
                )
            })
            .collect())
    }
}

/*************************************/
/** Region queries                  **/
/*************************************/

pub struct GetRegions;

impl Query for GetRegions {
    type Output = Vec<models::Region>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::regions::dsl::*;

        Ok(regions.order(name.asc()).load(&conn)?)
    }
}

/// The region name doubles as its URL slug, so lookup is by name.
pub struct GetRegionByName {
    pub name: String,
}

impl Query for GetRegionByName {
    type Output = Option<models::Region>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::regions::dsl::*;

        Ok(regions
            .filter(name.eq(&self.name))
            .first(&conn)
            .optional()?)
    }
}

pub struct GetRegionById {
    pub id: i32,
}

impl Query for GetRegionById {
    type Output = Option<models::Region>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::regions::dsl::*;

        Ok(regions.find(self.id).first(&conn).optional()?)
    }
}

/*************************************/
/** Whiskey queries                 **/
/*************************************/

pub struct GetWhiskeys;

impl Query for GetWhiskeys {
    type Output = Vec<models::Whiskey>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::whiskeys::dsl::*;

        Ok(whiskeys.order(name.asc()).load(&conn)?)
    }
}

pub struct GetBrandNames;

impl Query for GetBrandNames {
    type Output = Vec<String>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::whiskeys::dsl::*;

        Ok(whiskeys.select(name).order(name.asc()).load(&conn)?)
    }
}

pub struct GetWhiskeyById {
    pub id: i32,
}

impl Query for GetWhiskeyById {
    type Output = Option<models::Whiskey>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::whiskeys::dsl::*;

        Ok(whiskeys.find(self.id).first(&conn).optional()?)
    }
}

/// Brand pages are addressed by name; names are not guaranteed unique, so
/// this loads every entry carrying the name, like the catalog always has.
pub struct GetWhiskeysByName {
    pub name: String,
}

impl Query for GetWhiskeysByName {
    type Output = Vec<models::Whiskey>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::whiskeys::dsl::*;

        Ok(whiskeys.filter(name.eq(&self.name)).load(&conn)?)
    }
}

/// Entries in a region, each paired with the account that created it.
pub struct GetWhiskeysInRegion {
    pub region: String,
}

impl Query for GetWhiskeysInRegion {
    type Output = Vec<(models::Whiskey, models::User)>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::users;
        use self::schema::whiskeys::dsl::*;

        Ok(whiskeys
            .inner_join(users::table)
            .filter(region.eq(&self.region))
            .order(name.asc())
            .load(&conn)?)
    }
}

pub struct GetLatestWhiskeys {
    pub limit: i64,
}

impl Query for GetLatestWhiskeys {
    type Output = Vec<models::Whiskey>;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::whiskeys::dsl::*;

        Ok(whiskeys
            .order(date_added.desc())
            .limit(self.limit)
            .load(&conn)?)
    }
}

pub struct CreateWhiskey {
    pub name: String,
    pub description: Option<String>,
    pub whiskey_type: String,
    pub manufacturer: String,
    pub abv: String,
    pub proof: Option<String>,
    pub img_name: Option<String>,
    pub region_id: i32,
    pub region: String,
    pub user_id: i32,
}

impl Query for CreateWhiskey {
    type Output = models::Whiskey;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::whiskeys::dsl::*;

        let new_whiskey = models::NewWhiskey {
            name: &self.name,
            description: self.description.as_deref(),
            whiskey_type: &self.whiskey_type,
            manufacturer: &self.manufacturer,
            abv: &self.abv,
            proof: self.proof.as_deref(),
            img_name: self.img_name.as_deref(),
            region_id: &self.region_id,
            region: &self.region,
            user_id: &self.user_id,
        };

        Ok(diesel::insert_into(whiskeys)
            .values(&new_whiskey)
            .get_result(&conn)?)
    }
}

pub struct UpdateWhiskey {
    pub id: i32,
    pub changes: models::WhiskeyChanges,
}

impl Query for UpdateWhiskey {
    type Output = models::Whiskey;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::whiskeys::dsl::*;

        // An all-None changeset would make diesel bail before hitting the
        // database; an edit that changes nothing is still a success.
        if self.changes.is_empty() {
            return Ok(whiskeys.find(self.id).first(&conn)?);
        }

        Ok(diesel::update(whiskeys.find(self.id))
            .set(&self.changes)
            .get_result(&conn)?)
    }
}

pub struct DeleteWhiskey {
    pub id: i32,
}

impl Query for DeleteWhiskey {
    type Output = usize;

    fn execute(&self, conn: Connection) -> Result<Self::Output> {
        use self::schema::whiskeys::dsl::*;

        Ok(diesel::delete(whiskeys.find(self.id)).execute(&conn)?)
    }
}

// These need a live PostgreSQL; run with DATABASE_URL set and
// `cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use super::*;
    use textnonce::TextNonce;

    fn test_pool() -> Pool {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set!");
        r2d2::Pool::builder()
            .max_size(1)
            .build(r2d2::ConnectionManager::new(database_url))
            .expect("failed to create db connection pool")
    }

    fn unique_email() -> String {
        format!("{}@example.test", TextNonce::new().into_string())
    }

    fn delete_user(conn: &Connection, address: &str) {
        use crate::schema::users::dsl::*;
        diesel::delete(users.filter(email.eq(address)))
            .execute(conn)
            .expect("user cleanup");
    }

    #[test]
    #[ignore]
    fn first_login_creates_and_later_logins_reuse_the_account() {
        let pool = test_pool();
        let address = unique_email();

        let first = LookupOrCreateUser {
            name: "Alice".to_owned(),
            email: address.clone(),
            picture: None,
        }
        .execute(pool.get().expect("connection"))
        .expect("first login");

        // A later login with a changed profile reuses the row and never
        // updates it.
        let second = LookupOrCreateUser {
            name: "Alicia".to_owned(),
            email: address.clone(),
            picture: Some("https://example.test/alice.png".to_owned()),
        }
        .execute(pool.get().expect("connection"))
        .expect("second login");

        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Alice");
        assert_eq!(second.picture, None);

        let conn = pool.get().expect("connection");
        {
            use crate::schema::users::dsl::*;
            let rows: i64 = users
                .filter(email.eq(&address))
                .count()
                .get_result(&conn)
                .expect("row count");
            assert_eq!(rows, 1);
        }
        delete_user(&conn, &address);
    }

    #[test]
    #[ignore]
    fn top_contributors_rank_busiest_first() {
        let pool = test_pool();

        let heavy_email = unique_email();
        let light_email = unique_email();
        let heavy = LookupOrCreateUser {
            name: "Heavy".to_owned(),
            email: heavy_email.clone(),
            picture: None,
        }
        .execute(pool.get().expect("connection"))
        .expect("create user");
        let light = LookupOrCreateUser {
            name: "Light".to_owned(),
            email: light_email.clone(),
            picture: None,
        }
        .execute(pool.get().expect("connection"))
        .expect("create user");

        let conn = pool.get().expect("connection");
        let test_region: models::Region = {
            use crate::schema::regions::dsl::*;
            diesel::insert_into(regions)
                .values((
                    name.eq(format!("Testland {}", TextNonce::new())),
                    user_id.eq(heavy.id),
                ))
                .get_result(&conn)
                .expect("create region")
        };

        {
            use crate::schema::whiskeys::dsl::*;
            for (owner, label) in &[(heavy.id, "One"), (heavy.id, "Two"), (light.id, "Three")] {
                diesel::insert_into(whiskeys)
                    .values((
                        name.eq(*label),
                        whiskey_type.eq("Single malt"),
                        manufacturer.eq("Test Distilling"),
                        abv.eq("40.00"),
                        region_id.eq(test_region.id),
                        region.eq(&test_region.name),
                        user_id.eq(*owner),
                    ))
                    .execute(&conn)
                    .expect("create whiskey");
            }
        }
        drop(conn);

        let contributors = GetTopContributors { limit: 1000 }
            .execute(pool.get().expect("connection"))
            .expect("contributors");

        let ours: Vec<(i32, i64)> = contributors
            .iter()
            .filter(|(user, _)| user.id == heavy.id || user.id == light.id)
            .map(|(user, count)| (user.id, *count))
            .collect();
        assert_eq!(ours, vec![(heavy.id, 2), (light.id, 1)]);

        let conn = pool.get().expect("connection");
        {
            use crate::schema::whiskeys::dsl::*;
            diesel::delete(whiskeys.filter(user_id.eq_any(vec![heavy.id, light.id])))
                .execute(&conn)
                .expect("whiskey cleanup");
        }
        {
            use crate::schema::regions::dsl::*;
            diesel::delete(regions.find(test_region.id))
                .execute(&conn)
                .expect("region cleanup");
        }
        delete_user(&conn, &heavy_email);
        delete_user(&conn, &light_email);
    }
}
