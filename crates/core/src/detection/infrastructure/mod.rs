pub mod math;
pub mod model_resolver;
pub mod onnx_face_detector;
pub mod scripted_face_detector;
pub mod threaded_face_detector;
