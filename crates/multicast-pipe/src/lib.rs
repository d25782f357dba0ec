//! multicast-pipe: fan a single byte stream out to many independent readers.
//!
//! A [`BroadcastPipe`] has one producer and any number of subscribers. Each
//! [`Subscription`] is a bounded in-memory channel read at its own pace;
//! subscribers that go away are detached without the producer noticing.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use multicast_pipe::BroadcastPipe;
//! use tokio::io::AsyncReadExt;
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipe = BroadcastPipe::new();
//!     let mut console = pipe.subscribe().unwrap();
//!     let mut log = pipe.subscribe().unwrap();
//!
//!     let producer = pipe.clone();
//!     tokio::spawn(async move {
//!         producer.write(b"[info] compiling\n").await.unwrap();
//!         producer.close().await.unwrap();
//!     });
//!
//!     let mut a = String::new();
//!     let mut b = String::new();
//!     console.read_to_string(&mut a).await.unwrap();
//!     log.read_to_string(&mut b).await.unwrap();
//!     assert_eq!(a, b);
//! }
//! ```

pub mod error;
pub mod pipe;
pub mod pump;
pub mod subscription;

pub use error::{PipeError, Result};
pub use pipe::{BroadcastPipe, PipeStats};
pub use pump::pump;
pub use subscription::Subscription;
