mod algorithm;
mod batch;
mod config;
mod equation_system;
mod field_functions;
mod geometry;
mod master_element;
mod parallel;
mod time_integrator;
