/// fern based console and file logging for applications embedding the engine.
pub mod logger;
