#[cfg(test)]
pub mod tests {
  use std::thread;
  use rand::Rng;

  use feb_dataclasses::{DriverCommand,
                        EventRecord,
                        HistogramSet,
                        TriggerMode};
  use feb_dataclasses::constants::{NCHN,
                                   NBINS,
                                   MAGIC_WORD32};
  use feb_dataclasses::serialization::Serialization;
  use febcal_histos::{ControlLink,
                      DriverError,
                      EventDemultiplexer,
                      ZmqDriver};

  fn random_buffer(board : u16, n_records : usize) -> Vec<u8> {
    let mut rng    = rand::thread_rng();
    let mut stream = Vec::<u8>::new();
    for k in 0..n_records {
      let mut rec  = EventRecord::new();
      rec.board_id = board;
      rec.ts0      = rng.gen::<u32>();
      for ch in 0..NCHN {
        rec.adc[ch] = rng.gen_range(0..NBINS as u16);
      }
      if k == n_records - 1 {
        rec.ts1 = MAGIC_WORD32;
      }
      stream.extend_from_slice(&rec.to_bytestream());
    }
    stream
  }

  #[test]
  fn every_channel_gets_one_entry_per_event() {
    let buffer        = random_buffer(12, 200);
    let mut histos    = HistogramSet::new(12, vec![]);
    let mut demux     = EventDemultiplexer::new(12, TriggerMode::AllChannels);
    let mut remaining = 1000usize;
    let n_used = demux.fill_from_buffer(&buffer, 0, &mut histos, &mut remaining);
    assert_eq!(n_used, 200);
    assert_eq!(remaining, 800);
    let mut total_gain = 0u64;
    for ch in 0..NCHN {
      assert_eq!(histos.pedestal_entries(ch) + histos.gain_entries(ch), 200);
      total_gain += histos.gain_entries(ch);
    }
    // one pair per event
    assert_eq!(total_gain, 400);
  }

  #[test]
  fn driver_request_is_acknowledged() {
    let ctx = zmq::Context::new();
    let rep = ctx.socket(zmq::REP).unwrap();
    rep.bind("inproc://febdriver-ack").unwrap();
    let responder = thread::spawn(move || {
      let frame = rep.recv_bytes(0).unwrap();
      rep.send("ACK", 0).unwrap();
      frame
    });
    let mut driver = ZmqDriver::connect(&ctx, "inproc://febdriver-ack", 2000, 1).unwrap();
    let reply = driver.request(&DriverCommand::BiasOn(5)).unwrap();
    assert_eq!(reply, b"ACK".to_vec());
    let frame = responder.join().unwrap();
    assert_eq!(DriverCommand::from_frame(&frame).unwrap(), DriverCommand::BiasOn(5));
  }

  #[test]
  fn silent_driver_is_unresponsive() {
    let ctx = zmq::Context::new();
    let rep = ctx.socket(zmq::REP).unwrap();
    rep.bind("inproc://febdriver-silent").unwrap();
    let mut driver = ZmqDriver::connect(&ctx, "inproc://febdriver-silent", 50, 2).unwrap();
    match driver.request(&DriverCommand::DaqEnd) {
      Err(DriverError::Unresponsive {command, attempts}) => {
        assert_eq!(command, "DAQ_END");
        assert_eq!(attempts, 2);
      }
      other => panic!("Expected the driver to be unresponsive, got {:?}", other)
    }
    drop(rep);
  }
}
