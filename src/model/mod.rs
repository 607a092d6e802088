pub mod advance_payment;
pub mod attendance_type;
pub mod client_type;
pub mod role;
pub mod salary_record;
pub mod site;
