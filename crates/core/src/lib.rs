//! Shoulder-surfing detection: front-camera capture, frame gating, face
//! counting and alerting.

pub mod alert {
    pub mod domain {
        pub mod alert_sink;
    }
    pub mod infrastructure;
}

pub mod capture {
    pub mod domain {
        pub mod camera_backend;
        pub mod capture_error;
        pub mod capture_session;
        pub mod frame_reader;
        pub mod pixel_format_converter;
        pub mod resource_arbiter;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod face_detector;
        pub mod frame_throttle;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod detection_pipeline;
    pub mod monitor_service;
    pub mod pipeline_liveness;
    pub mod pipeline_stats;
}

pub mod shared {
    pub mod constants;
    pub mod converted_image;
    pub mod frame;
    pub mod monitor_config;
}
