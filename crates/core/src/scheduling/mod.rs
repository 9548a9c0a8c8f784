pub mod frame_queue;
