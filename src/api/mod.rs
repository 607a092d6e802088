pub mod advance_deduction;
pub mod attendance_type;
pub mod client_type;
pub mod salary_slip;
pub mod supervisor_site;
