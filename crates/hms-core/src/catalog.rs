//! Tables the hospital backend declares.
//!
//! Timestamps are `TIMESTAMP` (no zone) with a `NOW()` server default and
//! booleans carry their server default, so a column added to a populated
//! table gives existing rows the same value a fresh insert would get.

use crate::error::Result;
use crate::schema::{ColumnDef, IndexDef, SqlType, TableDef, TargetSchema};

/// Appointment status values.
pub mod appointment_status {
    pub const CONFIRMED: &str = "confirmed";
    pub const CANCELLED: &str = "cancelled";
    pub const COMPLETED: &str = "completed";
    pub const NO_SHOW: &str = "no-show";
    pub const PENDING: &str = "pending";

    pub const ALL: [&str; 5] = [CONFIRMED, CANCELLED, COMPLETED, NO_SHOW, PENDING];
}

/// Contact message status values.
pub mod contact_status {
    pub const NEW: &str = "new";
    pub const READ: &str = "read";
    pub const RESOLVED: &str = "resolved";

    pub const ALL: [&str; 3] = [NEW, READ, RESOLVED];
}

/// Patient-profile columns added to `users` after the first release.
pub const USER_PROFILE_COLUMNS: [&str; 11] = [
    "nid",
    "date_of_birth",
    "gender",
    "blood_group",
    "division",
    "district",
    "upazila",
    "village",
    "address",
    "emergency_contact_name",
    "emergency_contact_phone",
];

/// The backend's full target schema.
pub fn hospital_schema() -> Result<TargetSchema> {
    TargetSchema::new(vec![
        users(),
        departments(),
        doctors(),
        appointments(),
        contact_messages(),
        services(),
        audit_logs(),
        ambulance_services(),
        eye_products(),
    ])
}

fn varchar(name: &str, len: u32) -> ColumnDef {
    ColumnDef::new(name, SqlType::Varchar(Some(len)))
}

fn flag(name: &str, default: bool) -> ColumnDef {
    ColumnDef::new(name, SqlType::Boolean).default_sql(if default { "TRUE" } else { "FALSE" })
}

fn created_at() -> ColumnDef {
    ColumnDef::new("created_at", SqlType::Timestamp).default_sql("NOW()")
}

fn updated_at() -> ColumnDef {
    ColumnDef::new("updated_at", SqlType::Timestamp).default_sql("NOW()")
}

fn status(default: &str) -> ColumnDef {
    varchar("status", 50)
        .default_sql(&format!("'{}'", default))
        .indexed()
}

fn users() -> TableDef {
    TableDef::new("users")
        .column(ColumnDef::id())
        .column(varchar("phone", 20).not_null().unique().indexed())
        .column(varchar("hashed_password", 255).not_null())
        .column(varchar("full_name", 255))
        .column(varchar("email", 255).unique().indexed())
        .column(flag("is_active", true).indexed())
        .column(flag("is_admin", false))
        .column(flag("is_doctor", false))
        .column(varchar("nid", 50).unique())
        .column(ColumnDef::new("date_of_birth", SqlType::Date))
        .column(varchar("gender", 20))
        .column(varchar("blood_group", 10))
        .column(varchar("division", 100))
        .column(varchar("district", 100))
        .column(varchar("upazila", 100))
        .column(varchar("village", 255))
        .column(ColumnDef::new("address", SqlType::Text))
        .column(varchar("emergency_contact_name", 255))
        .column(varchar("emergency_contact_phone", 20))
        .column(created_at().indexed())
        .column(updated_at())
        .index(IndexDef::new("idx_users_phone_active", &["phone", "is_active"]))
}

fn departments() -> TableDef {
    TableDef::new("departments")
        .column(ColumnDef::id())
        .column(varchar("name", 255).not_null().unique().indexed())
        .column(ColumnDef::new("description", SqlType::Text))
        .column(varchar("image_url", 500))
        .column(flag("is_active", true).indexed())
        .column(created_at())
        .column(updated_at())
}

fn doctors() -> TableDef {
    TableDef::new("doctors")
        .column(ColumnDef::id())
        .column(
            ColumnDef::new("user_id", SqlType::Integer)
                .not_null()
                .unique()
                .indexed()
                .references("users", "id"),
        )
        .column(varchar("specialty", 255).not_null().indexed())
        .column(varchar("image_url", 500))
        .column(ColumnDef::new("bio", SqlType::Text))
        .column(ColumnDef::new("experience_years", SqlType::Integer))
        .column(
            ColumnDef::new("department_id", SqlType::Integer)
                .not_null()
                .indexed()
                .references("departments", "id"),
        )
        .column(flag("is_available", true).indexed())
        .column(created_at())
        .column(updated_at())
        .index(IndexDef::new(
            "idx_doctors_department_available",
            &["department_id", "is_available"],
        ))
}

fn appointments() -> TableDef {
    TableDef::new("appointments")
        .column(ColumnDef::id())
        .column(
            ColumnDef::new("patient_id", SqlType::Integer)
                .not_null()
                .indexed()
                .references("users", "id"),
        )
        .column(
            ColumnDef::new("doctor_id", SqlType::Integer)
                .indexed()
                .references("doctors", "id"),
        )
        .column(
            ColumnDef::new("department_id", SqlType::Integer)
                .not_null()
                .indexed()
                .references("departments", "id"),
        )
        .column(
            ColumnDef::new("appointment_date", SqlType::Date)
                .not_null()
                .indexed(),
        )
        .column(ColumnDef::new("appointment_time", SqlType::Time).not_null())
        .column(ColumnDef::new("notes", SqlType::Text))
        .column(status(appointment_status::CONFIRMED))
        .column(created_at())
        .column(updated_at())
        .index(IndexDef::new(
            "idx_appointments_patient_date",
            &["patient_id", "appointment_date"],
        ))
        .index(IndexDef::new(
            "idx_appointments_doctor_date",
            &["doctor_id", "appointment_date"],
        ))
        .index(IndexDef::new(
            "idx_appointments_status_date",
            &["status", "appointment_date"],
        ))
}

fn contact_messages() -> TableDef {
    TableDef::new("contact_messages")
        .column(ColumnDef::id())
        .column(varchar("name", 255).not_null())
        .column(varchar("email", 255).not_null().indexed())
        .column(varchar("phone", 20))
        .column(varchar("subject", 255))
        .column(ColumnDef::new("message", SqlType::Text).not_null())
        .column(status(contact_status::NEW))
        .column(created_at())
        .column(updated_at())
        .index(IndexDef::new(
            "idx_contact_messages_status_date",
            &["status", "created_at"],
        ))
}

fn services() -> TableDef {
    TableDef::new("services")
        .column(ColumnDef::id())
        .column(varchar("name", 255).not_null().unique())
        .column(ColumnDef::new("description", SqlType::Text))
        .column(varchar("icon", 100))
        .column(flag("is_active", true).indexed())
        .column(created_at())
        .column(updated_at())
}

fn audit_logs() -> TableDef {
    TableDef::new("audit_logs")
        .column(ColumnDef::id())
        .column(
            ColumnDef::new("user_id", SqlType::Integer)
                .indexed()
                .references("users", "id"),
        )
        .column(varchar("action", 100).not_null())
        .column(varchar("entity_type", 100).not_null())
        .column(ColumnDef::new("entity_id", SqlType::Integer))
        .column(ColumnDef::new("old_values", SqlType::Json))
        .column(ColumnDef::new("new_values", SqlType::Json))
        .column(varchar("ip_address", 45))
        .column(created_at().indexed())
        .index(IndexDef::new(
            "idx_audit_logs_user_date",
            &["user_id", "created_at"],
        ))
        .index(IndexDef::new(
            "idx_audit_logs_entity",
            &["entity_type", "entity_id"],
        ))
}

fn ambulance_services() -> TableDef {
    TableDef::new("ambulance_services")
        .column(ColumnDef::id())
        .column(varchar("name", 255).not_null().indexed())
        .column(ColumnDef::new("description", SqlType::Text))
        .column(varchar("phone", 20).not_null())
        .column(varchar("location", 500))
        .column(varchar("latitude", 50))
        .column(varchar("longitude", 50))
        .column(flag("available_24_7", true))
        .column(
            ColumnDef::new("ambulance_count", SqlType::Integer)
                .not_null()
                .default_sql("1"),
        )
        .column(flag("is_active", true).indexed())
        .column(created_at())
        .column(updated_at())
}

fn eye_products() -> TableDef {
    TableDef::new("eye_products")
        .column(ColumnDef::id())
        .column(varchar("name", 255).not_null().indexed())
        .column(ColumnDef::new("description", SqlType::Text))
        .column(varchar("category", 100).not_null().indexed())
        .column(varchar("brand", 255).indexed())
        .column(varchar("price", 50))
        .column(varchar("image_url", 500))
        .column(
            ColumnDef::new("stock_quantity", SqlType::Integer)
                .not_null()
                .default_sql("0"),
        )
        .column(flag("is_available", true))
        .column(flag("is_active", true).indexed())
        .column(created_at())
        .column(updated_at())
}
