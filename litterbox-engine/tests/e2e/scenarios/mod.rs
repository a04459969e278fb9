mod concurrency;
mod driver_and_fuzzy;
mod dynamic_jobs;
mod health;
mod persistence;
mod static_jobs;
