pub mod analysis_service;

pub use analysis_service::{
    AnalysisClient, AnalysisConfig, AnalysisError, AnalysisRequest, SentimentReply,
};
