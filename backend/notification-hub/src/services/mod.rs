pub mod fanout;
pub mod notification_service;

pub use fanout::FanoutPublisher;
pub use notification_service::NotificationService;
