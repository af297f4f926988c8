mod common;
mod eligibility;
mod matcher;
mod scoring;
