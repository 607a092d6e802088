pub mod db_utils;
pub mod request;
pub mod response;
