//! Events and the render-thread command queue
//!
//! Two directions of traffic:
//! - [`CommandQueue`]: settings changes posted from any thread. The engine drains it once
//!   per frame, before rendering, so render-mode state is only ever touched on the render
//!   thread.
//! - [`EventManager`]: notifications published by the render layer (field of view changes,
//!   camera orientation, VR devices, scene objects) to whoever subscribed.

use std::path::PathBuf;
use std::sync::mpsc;

use glam::DVec3;
use parking_lot::Mutex;

use crate::process::vr::VrDevice;
use crate::scene::EntityId;
use crate::settings::{CubemapProjection, StereoProfile};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // Commands
    /// Toggle cubemap mode with the given projection
    CubemapCmd {
        active: bool,
        projection: CubemapProjection,
    },
    CubemapProjectionCmd(CubemapProjection),
    PlanetariumProjectionCmd(CubemapProjection),
    /// Cube face side length in pixels
    CubemapResolutionCmd(u32),
    /// Dome aperture in degrees
    PlanetariumApertureCmd(f32),
    /// Angle from zenith in degrees
    PlanetariumAngleCmd(f32),
    IndexOfRefractionCmd(f32),
    PlanetariumGeometryWarpFileCmd(PathBuf),
    /// Save the current cube faces into the given directory
    ScreenshotCubemapCmd(PathBuf),
    StereoscopicCmd(bool),
    StereoProfileCmd(StereoProfile),
    FrameSizeUpdate {
        width: u32,
        height: u32,
    },
    ScreenshotSizeUpdate {
        width: u32,
        height: u32,
    },

    // Notifications
    /// Field of view change in degrees
    FovCmd(f32),
    CameraOrientationUpdate {
        direction: DVec3,
        up: DVec3,
        width: u32,
        height: u32,
    },
    VrDeviceConnected(VrDevice),
    VrDeviceDisconnected(VrDevice),
    SceneAddObject(EntityId),
    SceneRemoveObject(EntityId),
}

/// Publish/subscribe bus for render-layer notifications
#[derive(Default)]
pub struct EventManager {
    subscribers: Mutex<Vec<mpsc::Sender<Event>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event published from now on
    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to all live subscribers, forgetting the ones that hung up
    pub fn publish(&self, event: Event) {
        log::trace!("Publishing {:?}", event);
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Cloneable handle for posting commands to the render thread
#[derive(Clone)]
pub struct CommandSender {
    sender: mpsc::Sender<Event>,
}

impl CommandSender {
    /// Post a command; returns false if the render thread is gone
    pub fn post(&self, event: Event) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Single-consumer queue of commands, drained by the render thread once per frame
pub struct CommandQueue {
    sender: mpsc::Sender<Event>,
    receiver: mpsc::Receiver<Event>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    /// Take every command posted so far, in posting order
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let events = EventManager::new();
        let a = events.subscribe();
        let b = events.subscribe();

        events.publish(Event::FovCmd(90.0));

        assert_eq!(a.try_recv().unwrap(), Event::FovCmd(90.0));
        assert_eq!(b.try_recv().unwrap(), Event::FovCmd(90.0));
    }

    #[test]
    fn test_dropped_subscriber_is_forgotten() {
        let events = EventManager::new();
        let kept = events.subscribe();
        drop(events.subscribe());

        events.publish(Event::FovCmd(45.0));

        assert_eq!(events.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), Event::FovCmd(45.0));
    }

    #[test]
    fn test_commands_from_other_thread_drain_in_order() {
        let queue = CommandQueue::new();
        let sender = queue.sender();

        let handle = std::thread::spawn(move || {
            sender.post(Event::PlanetariumApertureCmd(200.0));
            sender.post(Event::PlanetariumAngleCmd(30.0));
        });
        handle.join().unwrap();

        assert_eq!(
            queue.drain(),
            vec![
                Event::PlanetariumApertureCmd(200.0),
                Event::PlanetariumAngleCmd(30.0)
            ]
        );
        assert!(queue.drain().is_empty());
    }
}
