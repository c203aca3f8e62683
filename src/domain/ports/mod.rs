pub mod generated_image_repository;
pub mod image_generation;
pub mod job_handler;
pub mod job_repository;
pub mod time_service;
