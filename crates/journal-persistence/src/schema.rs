//! Esquema Diesel (escrito a mano, equivalente a `diesel print-schema`).

diesel::table! {
    journal_events (id) {
        id -> BigInt,
        #[sql_name = "ref"]
        ref_ -> Text,
        version -> BigInt,
        event -> Text,
        payload -> Nullable<Jsonb>,
        initiated_by -> Nullable<Text>,
        created_on -> Timestamptz,
    }
}
