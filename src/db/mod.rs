//! Database layer (Supabase REST).

pub mod supabase;

pub use supabase::SupabaseDb;

/// Table names as constants.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const SCREENINGS: &str = "screenings";
}

/// Storage bucket names as constants.
pub mod buckets {
    /// Uploaded screening images (public bucket)
    pub const SCREENING_IMAGES: &str = "screening_images";
}
