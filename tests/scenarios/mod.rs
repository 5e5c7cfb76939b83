mod cache_aside_tests;
mod gateway_tests;
mod realtime_tests;
mod use_case_tests;
