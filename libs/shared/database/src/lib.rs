pub mod audit;
pub mod supabase;
