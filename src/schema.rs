table! {
    regions (id) {
        id -> Int4,
        name -> Varchar,
        user_id -> Int4,
    }
}

table! {
    users (id) {
        id -> Int4,
        name -> Varchar,
        email -> Varchar,
        picture -> Nullable<Varchar>,
    }
}

table! {
    whiskeys (id) {
        id -> Int4,
        name -> Varchar,
        description -> Nullable<Varchar>,
        whiskey_type -> Varchar,
        manufacturer -> Varchar,
        abv -> Varchar,
        proof -> Nullable<Varchar>,
        img_name -> Nullable<Varchar>,
        date_added -> Timestamptz,
        region_id -> Int4,
        region -> Varchar,
        user_id -> Int4,
    }
}

joinable!(regions -> users (user_id));
joinable!(whiskeys -> regions (region_id));
joinable!(whiskeys -> users (user_id));

allow_tables_to_appear_in_same_query!(regions, users, whiskeys,);
