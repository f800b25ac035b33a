// Mirrors the DDL in `db::init`.

diesel::table! {
    quotes (id) {
        id -> BigInt,
        symbol -> Text,
        price -> Double,
        datetime -> Text,
    }
}
