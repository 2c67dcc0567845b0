//! In-process publish/subscribe event dispatcher.
//!
//! Producers publish events identified by a hierarchical topic string
//! (`org/celix/test`) through [`engine::EventAdmin::send`] (synchronous) or
//! [`engine::EventAdmin::post`] (asynchronous, via a bounded queue and a
//! fixed worker pool). Consumers register a [`handler::EventHandler`] for
//! one or more topic patterns, optionally narrowed by an LDAP-style
//! [`filter`] over the event's [`properties`].
//!
//! ```no_run
//! use celix_event_admin::engine::EventAdmin;
//! use celix_event_admin::handler::{EventHandler, HandleResult};
//! use celix_event_admin::properties::Properties;
//! use celix_event_admin::registry::HandlerRegistration;
//!
//! struct Logger;
//! impl EventHandler for Logger {
//!     fn handle_event(&self, topic: &str, _properties: &Properties) -> HandleResult {
//!         println!("received {topic}");
//!         HandleResult::Ok
//!     }
//! }
//!
//! let admin = EventAdmin::builder().build();
//! admin.start().unwrap();
//! admin
//!     .add_handler(HandlerRegistration {
//!         service_id: 1,
//!         service: Box::new(Logger),
//!         topics: "org/celix/*".to_string(),
//!         description: Some("example logger".to_string()),
//!         delivery: None,
//!         filter: None,
//!     })
//!     .unwrap();
//! admin.send("org/celix/test", Properties::new()).unwrap();
//! admin.remove_handler(1);
//! admin.stop();
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod handler;
pub mod properties;
pub mod queue;
pub mod registry;
pub mod topic;

pub use engine::EventAdmin;
pub use error::{EventAdminError, EventAdminResult, ErrorKind};
pub use event::Event;
pub use properties::{Properties, PropertyValue};
