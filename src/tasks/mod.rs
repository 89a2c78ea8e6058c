mod cleanup;

pub use cleanup::JobCleanupTask;
