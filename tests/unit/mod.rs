mod concurrency_tests;
mod intake_pipeline_tests;
mod scenario_tests;
mod snapshot_persistence_tests;
