pub mod inbound_repo;
pub mod setting_repo;
pub mod user_repo;

pub use inbound_repo::InboundRepository;
pub use setting_repo::SettingRepository;
pub use user_repo::UserRepository;
