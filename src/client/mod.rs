//! Client side: snapshot buffering and interpolation, input sampling,
//! rendering contract and the connection driver

pub mod input;
pub mod net;
pub mod render;
pub mod sync;

pub use input::{InputSource, KeyState, ScriptedInput};
pub use net::{ClientError, ClientOptions};
pub use render::{Renderer, TracingRenderer};
pub use sync::{RenderFrame, RenderState, SharedSyncBuffer, SyncBuffer};
