//! Work queue between calibration clients and fitters
//!
//! ```text
//! client -PUSH-> [task in] balancer [task out] <-PULL- fitter
//! client <-PULL- [result out] balancer [result in] <-PUSH- fitter
//! ```
//!
//! All four sockets are bound by the balancer. 
//! Messages are queued until the other side is 
//! able to take them.

use std::collections::VecDeque;
use std::process::Child;
use std::sync::atomic::{AtomicBool,
                        Ordering};

use febcal_lib::BalancerSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct BalancerEndpoints {
  pub task_input        : String,
  pub task_output       : String,
  pub evaluation_input  : String,
  pub evaluation_output : String,
}

impl BalancerEndpoints {
  pub fn from_settings(settings : &BalancerSettings) -> Self {
    Self {
      task_input        : format!("tcp://*:{}", settings.task_input_port),
      task_output       : format!("tcp://*:{}", settings.task_output_port),
      evaluation_input  : format!("tcp://*:{}", settings.evaluation_input_port),
      evaluation_output : format!("tcp://*:{}", settings.evaluation_output_port),
    }
  }
}

pub struct Balancer {
  task_in        : zmq::Socket,
  task_out       : zmq::Socket,
  eval_in        : zmq::Socket,
  eval_out       : zmq::Socket,
  tasks          : VecDeque<Vec<u8>>,
  results        : VecDeque<Vec<u8>>,
  pub n_tasks    : usize,
  pub n_results  : usize,
}

fn bound(ctx : &zmq::Context, kind : zmq::SocketType, address : &str) -> Result<zmq::Socket, zmq::Error> {
  let socket = ctx.socket(kind)?;
  match socket.bind(address) {
    Err(err) => {
      error!("Unable to bind to {}! {}", address, err);
      Err(err)
    }
    Ok(_) => {
      info!("Bound socket to {}", address);
      Ok(socket)
    }
  }
}

impl Balancer {

  pub fn bind(ctx : &zmq::Context, endpoints : &BalancerEndpoints) -> Result<Self, zmq::Error> {
    Ok(Self {
      task_in   : bound(ctx, zmq::PULL, &endpoints.task_input)?,
      task_out  : bound(ctx, zmq::PUSH, &endpoints.task_output)?,
      eval_in   : bound(ctx, zmq::PULL, &endpoints.evaluation_input)?,
      eval_out  : bound(ctx, zmq::PUSH, &endpoints.evaluation_output)?,
      tasks     : VecDeque::<Vec<u8>>::new(),
      results   : VecDeque::<Vec<u8>>::new(),
      n_tasks   : 0,
      n_results : 0,
    })
  }

  /// Messages waiting for a fitter or a client
  pub fn pending(&self) -> (usize, usize) {
    (self.tasks.len(), self.results.len())
  }

  /// Move everything which is ready, wait at most 
  /// timeout_ms for something to happen.
  pub fn poll_once(&mut self, timeout_ms : i64) -> Result<(), zmq::Error> {
    let mut items = [
      self.task_in.as_poll_item(zmq::POLLIN),
      self.eval_in.as_poll_item(zmq::POLLIN),
      self.task_out.as_poll_item(if self.tasks.is_empty() {zmq::PollEvents::empty()} else {zmq::POLLOUT}),
      self.eval_out.as_poll_item(if self.results.is_empty() {zmq::PollEvents::empty()} else {zmq::POLLOUT}),
    ];
    zmq::poll(&mut items, timeout_ms)?;
    let (tasks_ready, results_ready) = (items[0].is_readable(), items[1].is_readable());
    drop(items);
    if tasks_ready {
      while let Ok(msg) = self.task_in.recv_bytes(zmq::DONTWAIT) {
        self.n_tasks += 1;
        self.tasks.push_back(msg);
      }
    }
    if results_ready {
      while let Ok(msg) = self.eval_in.recv_bytes(zmq::DONTWAIT) {
        self.n_results += 1;
        self.results.push_back(msg);
      }
    }
    forward(&self.task_out, &mut self.tasks);
    forward(&self.eval_out, &mut self.results);
    Ok(())
  }

  pub fn run(&mut self, stop : &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
      if let Err(err) = self.poll_once(200) {
        error!("Polling failed! {err}");
      }
    }
    info!("Forwarded {} tasks and {} results", self.n_tasks, self.n_results);
  }
}

/// Send until the queue is empty or the peer does 
/// not take any more
fn forward(socket : &zmq::Socket, queue : &mut VecDeque<Vec<u8>>) {
  while let Some(msg) = queue.front() {
    match socket.send(msg.as_slice(), zmq::DONTWAIT) {
      Err(zmq::Error::EAGAIN) => break,
      Err(err) => {
        error!("Unable to forward message! {err}");
        break;
      }
      Ok(_) => {
        queue.pop_front();
      }
    }
  }
}

/// Kill the fitter processes and wait for them.
/// Returns how many could be reaped.
pub fn stop_fitters(fitters : Vec<Child>) -> usize {
  let mut n_reaped = 0usize;
  for mut child in fitters {
    if let Err(err) = child.kill() {
      warn!("Unable to stop fitter {}! {}", child.id(), err);
    }
    match child.wait() {
      Err(err) => {
        warn!("Unable to reap fitter {}! {}", child.id(), err);
      }
      Ok(status) => {
        debug!("Fitter {} exited with {}", child.id(), status);
        n_reaped += 1;
      }
    }
  }
  n_reaped
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::process::Command;

  #[test]
  fn fitters_are_reaped() {
    let children : Vec<Child> = (0..2)
      .map(|_| Command::new("sleep").arg("30").spawn().unwrap())
      .collect();
    assert_eq!(stop_fitters(children), 2);
  }

  #[test]
  fn finished_fitters_are_reaped_too() {
    let mut child = Command::new("true").spawn().unwrap();
    child.wait().unwrap();
    assert_eq!(stop_fitters(vec![child]), 1);
  }

  #[test]
  fn endpoints_from_default_ports() {
    let ep = BalancerEndpoints::from_settings(&BalancerSettings::new());
    assert_eq!(ep.task_input, "tcp://*:7000");
    assert_eq!(ep.task_output, "tcp://*:7001");
    assert_eq!(ep.evaluation_input, "tcp://*:8001");
    assert_eq!(ep.evaluation_output, "tcp://*:8000");
  }
}
