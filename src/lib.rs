pub mod bulk;
pub mod config;
pub mod db;
pub mod documents;
pub mod generate;
pub mod html;
pub mod i18n;
pub mod openai;
pub mod retry;
